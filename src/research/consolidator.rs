//! Consolidator：把所有来源的记录综合成一篇报告
//!
//! 流程：构建带可靠性标注的上下文（超预算截断）→ 推理步骤生成 → 按策略提取正文
//! → 引用校验（剔除不在记录中的 URL）。参考文献由记录确定性生成，不依赖推理输出。
//! 没有任何记录时不调用推理步骤，直接返回固定文本；推理失败时返回固定的失败文本。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::state::ResearchState;
use crate::llm::{LlmClient, Message};
use crate::observability::Metrics;
use crate::research::bibliography;
use crate::research::citations::CitationGuard;
use crate::research::context::build_context;
use crate::research::extraction::{extract_report, ExtractionStrategy, REPORT_CLOSE, REPORT_OPEN};
use crate::research::persona::profile;
use crate::research::{reason, TASK_CONSOLIDATED_REPORT};

/// 没有任何检索结果时的综合文本
pub const NO_INFORMATION: &str =
    "No information was found for this topic in the consulted sources.";

/// 推理步骤失败时的综合文本
pub const FAILURE_FALLBACK: &str = "The consolidated synthesis could not be generated.";

/// 综合结果
#[derive(Debug, Clone, PartialEq)]
pub struct Consolidation {
    pub synthesis: String,
    pub bibliography: Vec<String>,
    /// 上下文是否被截断
    pub truncated: bool,
    /// 被引用校验移除的 URL
    pub stripped: Vec<String>,
    /// None 表示未调用推理或推理失败
    pub strategy: Option<ExtractionStrategy>,
}

impl Consolidation {
    pub fn is_fallback(&self) -> bool {
        self.synthesis == NO_INFORMATION || self.synthesis == FAILURE_FALLBACK
    }
}

pub struct Consolidator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
    max_context_chars: usize,
    verify_citations: bool,
    metrics: Metrics,
}

impl Consolidator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            timeout,
            max_context_chars: 50_000,
            verify_citations: true,
            metrics: Metrics::new(),
        }
    }

    pub fn with_max_context_chars(mut self, max: usize) -> Self {
        self.max_context_chars = max;
        self
    }

    pub fn with_citation_check(mut self, enabled: bool) -> Self {
        self.verify_citations = enabled;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// 生成综合文本与参考文献；永不失败
    pub async fn consolidate(&self, state: &ResearchState) -> Consolidation {
        let bibliography = bibliography::build(&state.results_by_source, &state.source_reliability);
        let context = build_context(state, self.max_context_chars);

        if context.is_empty() {
            tracing::info!("No records to consolidate, using no-information fallback");
            return Consolidation {
                synthesis: NO_INFORMATION.to_string(),
                bibliography,
                truncated: false,
                stripped: Vec::new(),
                strategy: None,
            };
        }

        let messages = vec![
            Message::system(system_prompt(state)),
            Message::user(format!(
                "{}\nRESEARCH MATERIAL ({} records from {} sources):\n\n{}",
                TASK_CONSOLIDATED_REPORT,
                context.records,
                state.source_reliability.len().max(1),
                context.text
            )),
        ];

        let started = Instant::now();
        let raw = match reason(&self.llm, messages, self.timeout).await {
            Ok(raw) => {
                self.metrics.record("consolidate", started.elapsed(), true);
                raw
            }
            Err(e) => {
                self.metrics.record("consolidate", started.elapsed(), false);
                tracing::warn!(error = %e, "Consolidation failed, using fallback synthesis");
                return Consolidation {
                    synthesis: FAILURE_FALLBACK.to_string(),
                    bibliography,
                    truncated: context.truncated,
                    stripped: Vec::new(),
                    strategy: None,
                };
            }
        };

        let extracted = extract_report(&raw);
        tracing::debug!(strategy = ?extracted.strategy, "Report extracted");
        if extracted.text.is_empty() {
            tracing::warn!("Consolidation produced no usable text, using fallback synthesis");
            return Consolidation {
                synthesis: FAILURE_FALLBACK.to_string(),
                bibliography,
                truncated: context.truncated,
                stripped: Vec::new(),
                strategy: Some(extracted.strategy),
            };
        }

        let (synthesis, stripped) = if self.verify_citations {
            let guard = CitationGuard::new(state.known_urls());
            let scrubbed = guard.scrub(&extracted.text);
            if !scrubbed.stripped.is_empty() {
                tracing::warn!(
                    count = scrubbed.stripped.len(),
                    urls = ?scrubbed.stripped,
                    "Removed URLs not present in retrieved records"
                );
            }
            (scrubbed.text, scrubbed.stripped)
        } else {
            (extracted.text, Vec::new())
        };

        Consolidation {
            synthesis,
            bibliography,
            truncated: context.truncated,
            stripped,
            strategy: Some(extracted.strategy),
        }
    }
}

/// 角色语气 + 格式约定 + 引用约定
fn system_prompt(state: &ResearchState) -> String {
    let persona = profile(state.persona);
    format!(
        "You are an expert research analyst. Produce a consolidated, professional report about \
         \"{topic}\" from the research material provided by the user.\n\n\
         TONE: {tone}\n\n\
         FORMAT CONTRACT:\n\
         - Use hierarchical Markdown headings (##, ###) for sections such as Introduction, Key Findings, \
           Implementations, Open Questions and Conclusions.\n\
         - Put details in bullet points under each heading.\n\
         - Never use numbered lists as headings.\n\
         - Weigh each source by its reliability line; prefer higher reliability when sources disagree.\n\n\
         CITATION CONTRACT:\n\
         - Every factual claim must cite its record as [label](url).\n\
         - The url must be copied verbatim from a record's URL line. Never invent, shorten or modify a URL.\n\
         - Records marked \"URL: none\" may be mentioned by title but never linked.\n\n\
         OUTPUT: wrap the whole report between {open} and {close}. Write nothing outside the tags.",
        topic = state.topic(),
        tone = persona.tone,
        open = REPORT_OPEN,
        close = REPORT_CLOSE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{Persona, ResultRecord, SourceReliability, SourceType};
    use crate::llm::{LlmError, MockLlmClient, ScriptedLlmClient, ScriptedReply};

    fn state_with_records() -> ResearchState {
        let mut s = ResearchState::new("rust async");
        s.merge_results(
            "wiki".into(),
            vec![ResultRecord::new("Rust", "Rust is a systems language.").with_url("http://a")],
        );
        s.merge_results(
            "web".into(),
            vec![ResultRecord::new("Blog", "Tokio is a runtime.").with_url("https://blog.example/tokio")],
        );
        s.record_reliability("wiki".into(), SourceReliability::new(4, SourceType::Encyclopedic));
        s.record_reliability("web".into(), SourceReliability::new(3, SourceType::Web));
        s
    }

    #[tokio::test]
    async fn test_empty_results_skip_reasoning() {
        let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::text("report")));
        let consolidator = Consolidator::new(llm.clone(), Duration::from_secs(1));
        let mut state = ResearchState::new("nothing");
        state.merge_results("web".into(), vec![]);

        let out = consolidator.consolidate(&state).await;
        assert_eq!(out.synthesis, NO_INFORMATION);
        assert!(out.bibliography.is_empty());
        assert!(out.is_fallback());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_fixed_fallback() {
        let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::Fail(LlmError::Timeout)));
        let out = Consolidator::new(llm, Duration::from_secs(1))
            .consolidate(&state_with_records())
            .await;
        assert_eq!(out.synthesis, FAILURE_FALLBACK);
        assert_eq!(out.bibliography.len(), 2);
    }

    #[tokio::test]
    async fn test_delimited_report_with_fabricated_link() {
        let reply = "<think>draft</think><report>\n## Overview\n- Rust [wiki](http://a)\n- Claim [made up](https://invented.example/x)\n</report>";
        let llm = Arc::new(
            ScriptedLlmClient::new().on(TASK_CONSOLIDATED_REPORT, ScriptedReply::text(reply)),
        );
        let out = Consolidator::new(llm, Duration::from_secs(1))
            .consolidate(&state_with_records())
            .await;
        assert_eq!(out.strategy, Some(ExtractionStrategy::Delimiter));
        assert!(out.synthesis.starts_with("## Overview"));
        assert!(out.synthesis.contains("[wiki](http://a)"));
        assert!(out.synthesis.contains("- Claim made up"));
        assert_eq!(out.stripped, vec!["https://invented.example/x".to_string()]);
    }

    #[tokio::test]
    async fn test_echo_output_only_contains_record_urls() {
        let out = Consolidator::new(Arc::new(MockLlmClient), Duration::from_secs(1))
            .consolidate(&state_with_records())
            .await;
        assert!(out.synthesis.contains("http://a"));
        assert!(out.synthesis.contains("https://blog.example/tokio"));
        assert!(out.stripped.is_empty());
    }

    #[tokio::test]
    async fn test_truncation_flag_propagates() {
        let llm = Arc::new(ScriptedLlmClient::new().otherwise(ScriptedReply::text("<report>ok</report>")));
        let out = Consolidator::new(llm, Duration::from_secs(1))
            .with_max_context_chars(30)
            .consolidate(&state_with_records())
            .await;
        assert!(out.truncated);
        assert_eq!(out.synthesis, "ok");
    }

    #[test]
    fn test_system_prompt_carries_persona_tone() {
        let state = ResearchState::new("x").with_persona(Persona::Business);
        let prompt = system_prompt(&state);
        assert!(prompt.contains("market analyst"));
        assert!(prompt.contains(REPORT_OPEN));
        assert!(prompt.contains("verbatim"));
    }
}
