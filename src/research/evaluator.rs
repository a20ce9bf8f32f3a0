//! Evaluator：判断综合结果是否充分，不充分时给出补充查询
//!
//! 判定顺序：
//! 1. 迭代次数达到上限：强制充分（终止保证）
//! 2. 快速摘要角色：首轮即充分
//! 3. 推理步骤审查高影响结论是否缺少佐证，输出 JSON
//!
//! 推理失败、超时、输出无法解析，或判为不充分却给不出任何缺口时，一律判为充分。

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::core::error::ResearchError;
use crate::core::state::ResearchState;
use crate::llm::{LlmClient, Message};
use crate::observability::Metrics;
use crate::research::extraction::extract_json_object;
use crate::research::{reason, TASK_SUFFICIENCY_REVIEW};

/// 补充查询的前缀
pub const REFINEMENT_PREFIX: &str = "VERIFY AND DEEPEN: ";

/// 补充查询构造策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefinementStrategy {
    /// 所有缺口与核查查询拼接
    #[default]
    AllGaps,
    /// 只取最重要的一项
    FirstGap,
    /// 取前 N 项
    Top(usize),
}

impl RefinementStrategy {
    /// 由缺口与核查查询构造补充查询；都为空时返回 None
    pub fn refine(&self, gaps: &[String], queries: &[String]) -> Option<String> {
        let items: Vec<&str> = gaps
            .iter()
            .chain(queries.iter())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            return None;
        }
        let take = match self {
            RefinementStrategy::AllGaps => items.len(),
            RefinementStrategy::FirstGap => 1,
            RefinementStrategy::Top(n) => (*n).max(1),
        };
        let mut picked: Vec<&str> = Vec::new();
        for item in items {
            if !picked.contains(&item) {
                picked.push(item);
            }
            if picked.len() == take {
                break;
            }
        }
        Some(format!("{}{}", REFINEMENT_PREFIX, picked.join(", ")))
    }
}

impl FromStr for RefinementStrategy {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "all" => Ok(RefinementStrategy::AllGaps),
            "first" => Ok(RefinementStrategy::FirstGap),
            other => other
                .strip_prefix("top:")
                .and_then(|n| n.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .map(RefinementStrategy::Top)
                .ok_or_else(|| ResearchError::Unparseable(format!("refinement strategy '{}'", other))),
        }
    }
}

/// 评估结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub sufficient: bool,
    /// 不充分时的下一轮主题
    pub next_query: Option<String>,
    pub reason: String,
}

impl Evaluation {
    pub fn sufficient(reason: impl Into<String>) -> Self {
        Self {
            sufficient: true,
            next_query: None,
            reason: reason.into(),
        }
    }

    pub fn insufficient(next_query: String, reason: impl Into<String>) -> Self {
        Self {
            sufficient: false,
            next_query: Some(next_query),
            reason: reason.into(),
        }
    }
}

/// 推理步骤输出的 JSON
#[derive(Debug, Deserialize)]
struct Review {
    sufficient: Option<bool>,
    #[serde(default)]
    gaps: Vec<String>,
    #[serde(default)]
    fact_check_queries: Vec<String>,
    #[serde(default)]
    reasoning: String,
}

pub struct Evaluator {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
    max_iterations: u32,
    strategy: RefinementStrategy,
    metrics: Metrics,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            timeout,
            max_iterations: 1,
            strategy: RefinementStrategy::default(),
            metrics: Metrics::new(),
        }
    }

    /// 首轮之外最多补充几轮
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_strategy(mut self, strategy: RefinementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// 评估当前综合结果；永不失败
    pub async fn evaluate(&self, state: &ResearchState) -> Evaluation {
        if state.iteration_count >= self.max_iterations {
            tracing::info!(
                iteration = state.iteration_count,
                ceiling = self.max_iterations,
                "Iteration ceiling reached, finishing"
            );
            return Evaluation::sufficient("iteration ceiling reached");
        }
        if state.persona.is_fast_digest() {
            tracing::info!(persona = state.persona.as_str(), "Fast digest persona, skipping refinement");
            return Evaluation::sufficient("fast digest persona");
        }

        let messages = vec![Message::user(review_prompt(state))];
        let started = Instant::now();
        let raw = match reason(&self.llm, messages, self.timeout).await {
            Ok(raw) => {
                self.metrics.record("evaluate", started.elapsed(), true);
                raw
            }
            Err(e) => {
                self.metrics.record("evaluate", started.elapsed(), false);
                tracing::warn!(error = %e, "Evaluation failed, treating synthesis as sufficient");
                return Evaluation::sufficient(format!("evaluation failed: {}", e));
            }
        };

        match parse_review(&raw) {
            Ok(review) => self.decide(review),
            Err(e) => {
                tracing::warn!(error = %e, "Evaluation output unparseable, treating synthesis as sufficient");
                Evaluation::sufficient("evaluation output unparseable")
            }
        }
    }

    fn decide(&self, review: Review) -> Evaluation {
        let reasoning = if review.reasoning.trim().is_empty() {
            "no reasoning given".to_string()
        } else {
            review.reasoning.trim().to_string()
        };
        if review.sufficient.unwrap_or(true) {
            return Evaluation::sufficient(reasoning);
        }
        match self.strategy.refine(&review.gaps, &review.fact_check_queries) {
            Some(next) => {
                tracing::info!(next_query = %next, "Synthesis insufficient, refining");
                Evaluation::insufficient(next, reasoning)
            }
            None => {
                tracing::info!("Synthesis judged insufficient without concrete gaps, finishing");
                Evaluation::sufficient(reasoning)
            }
        }
    }
}

fn parse_review(raw: &str) -> Result<Review, ResearchError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ResearchError::Unparseable("no JSON object in evaluation".to_string()))?;
    let review: Review =
        serde_json::from_str(json).map_err(|e| ResearchError::Unparseable(e.to_string()))?;
    if review.sufficient.is_none() {
        return Err(ResearchError::Unparseable("missing 'sufficient' field".to_string()));
    }
    Ok(review)
}

fn review_prompt(state: &ResearchState) -> String {
    format!(
        "{task}\n\
         You are a rigorous fact-checker. Review the research synthesis below about \"{topic}\".\n\
         Decide whether its high-impact claims are sufficiently verified by the cited sources, \
         or whether important gaps remain that another research pass should fill.\n\n\
         SYNTHESIS:\n{synthesis}\n\n\
         Reply ONLY with a JSON object:\n\
         {{\"sufficient\": true or false, \"gaps\": [\"missing or weakly supported topics\"], \
         \"fact_check_queries\": [\"concrete search queries to verify claims\"], \
         \"reasoning\": \"one sentence\"}}",
        task = TASK_SUFFICIENCY_REVIEW,
        topic = state.topic(),
        synthesis = state.synthesis,
    )
}
