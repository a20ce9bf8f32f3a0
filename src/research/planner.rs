//! Planner：选择本轮要查询的来源
//!
//! - 第一轮且调用方预置了计划：原样返回，不调用推理步骤
//! - 否则让推理步骤从可用来源中挑选子集（只接受 JSON 列表），成功后做多语言查询扩展
//! - 推理失败、超时或输出无法解析：使用固定的回退计划

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::ResearchError;
use crate::core::events::PlanOrigin;
use crate::core::state::{Cursor, Plan, ResearchState, SourceId};
use crate::llm::{LlmClient, Message};
use crate::research::extraction::extract_json_array;
use crate::research::persona::profile;
use crate::research::translation::QueryExpander;
use crate::research::{reason, TASK_SOURCE_SELECTION};

/// 规划结果
#[derive(Debug, Clone, PartialEq)]
pub struct PlanDecision {
    pub plan: Plan,
    /// 首步指针（空计划为 End）
    pub cursor: Cursor,
    pub origin: PlanOrigin,
    /// 语言 → 查询变体；预置计划与回退计划为空
    pub queries: BTreeMap<String, String>,
}

impl PlanDecision {
    fn new(plan: Plan, origin: PlanOrigin, queries: BTreeMap<String, String>) -> Self {
        Self {
            cursor: plan.cursor(),
            plan,
            origin,
            queries,
        }
    }
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
    fallback: Plan,
    expander: Option<QueryExpander>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self {
            llm,
            timeout,
            fallback: Plan::from_ids([SourceId::WIKI, SourceId::WEB]),
            expander: None,
        }
    }

    pub fn with_fallback<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceId>,
    {
        self.fallback = Plan::from_ids(ids);
        self
    }

    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        self.expander = Some(expander);
        self
    }

    /// 规划本轮来源；永不失败
    ///
    /// `available` 为（来源 id，描述）列表，只有其中的来源会被推理步骤选中。
    pub async fn plan(&self, state: &ResearchState, available: &[(SourceId, String)]) -> PlanDecision {
        if state.iteration_count == 0 {
            if let Some(pinned) = &state.pinned_plan {
                tracing::info!(sources = ?pinned.as_slice(), "Using caller-provided research plan");
                return PlanDecision::new(pinned.clone(), PlanOrigin::Pinned, BTreeMap::new());
            }
        }

        let prompt = build_prompt(state, available);
        let reasoned = match reason(&self.llm, vec![Message::user(prompt)], self.timeout).await {
            Ok(raw) => parse_plan(&raw, available),
            Err(e) => Err(e),
        };

        match reasoned {
            Ok(plan) => {
                tracing::info!(
                    sources = ?plan.as_slice(),
                    iteration = state.iteration_count,
                    "Research plan selected"
                );
                let queries = match &self.expander {
                    Some(expander) if !plan.is_empty() => expander.expand(&state.working_topic).await,
                    _ => BTreeMap::new(),
                };
                PlanDecision::new(plan, PlanOrigin::Reasoned, queries)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = ?self.fallback.as_slice(),
                    "Planning failed, using fallback plan"
                );
                PlanDecision::new(self.fallback.clone(), PlanOrigin::Fallback, BTreeMap::new())
            }
        }
    }
}

fn build_prompt(state: &ResearchState, available: &[(SourceId, String)]) -> String {
    let persona = profile(state.persona);
    let mut prompt = String::new();
    let _ = writeln!(prompt, "{}", TASK_SOURCE_SELECTION);
    let _ = writeln!(
        prompt,
        "You are {} Your task is to analyse a topic and decide which information sources are the most relevant to investigate it.\n",
        persona.role
    );
    let _ = writeln!(prompt, "RESEARCH TOPIC: {}", state.working_topic);
    if state.working_topic != state.topic() {
        let _ = writeln!(prompt, "ORIGINAL TOPIC: {}", state.topic());
    }
    prompt.push_str("\nAVAILABLE SOURCES:\n");
    for (id, description) in available {
        let _ = writeln!(prompt, "- {}: {}", id, description);
    }
    let preferred: Vec<&str> = persona
        .preferred_sources
        .iter()
        .copied()
        .filter(|p| available.iter().any(|(id, _)| id.as_str() == *p))
        .collect();
    prompt.push_str(
        "\nINSTRUCTIONS:\n\
         1. Reply ONLY with a JSON list of the source ids to consult.\n\
         2. Prefer quality over quantity. Do not select every source unless it is needed.\n\
         3. If the topic is highly technical or about programming, prioritise github, so and scholar.\n\
         4. If the topic is news or a trend, prioritise web, hn and reddit.\n",
    );
    if !preferred.is_empty() {
        let _ = writeln!(
            prompt,
            "5. Given your role, lean towards: {}.",
            preferred.join(", ")
        );
    }
    prompt.push_str("\nEXAMPLE OUTPUT:\n[\"wiki\", \"arxiv\", \"github\"]\n");
    prompt
}

/// 解析推理输出中的来源列表，只保留可用来源
///
/// `[]` 是合法的空计划；列表非空但没有一个可用来源时视为无法解析。
pub fn parse_plan(raw: &str, available: &[(SourceId, String)]) -> Result<Plan, ResearchError> {
    let json = extract_json_array(raw)
        .ok_or_else(|| ResearchError::Unparseable(format!("no JSON list in: {}", preview(raw))))?;
    let items: Vec<serde_json::Value> = serde_json::from_str(json)
        .map_err(|e| ResearchError::Unparseable(format!("{}: {}", e, preview(json))))?;
    if items.is_empty() {
        return Ok(Plan::empty());
    }

    let mut unknown = Vec::new();
    let known: Vec<SourceId> = items
        .iter()
        .filter_map(|v| v.as_str())
        .map(SourceId::new)
        .filter(|id| {
            let ok = available.iter().any(|(a, _)| a == id);
            if !ok {
                unknown.push(id.to_string());
            }
            ok
        })
        .collect();
    if !unknown.is_empty() {
        tracing::debug!(unknown = ?unknown, "Planner proposed unavailable sources, ignored");
    }

    let plan = Plan::from_ids(known);
    if plan.is_empty() {
        return Err(ResearchError::Unparseable(format!(
            "no available source in: {}",
            preview(json)
        )));
    }
    Ok(plan)
}

fn preview(s: &str) -> String {
    s.chars().take(200).collect()
}
