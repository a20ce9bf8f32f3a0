//! 研究请求与输入校验
//!
//! 校验属于外层协作方：去空白、长度 3..=200、去掉 `<>"'`、解析深度 / 角色、预置计划去重。
//! 通过校验的请求才会交给 Orchestrator。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::state::{DepthMode, Persona, Plan, ResearchState, SourceId, TimeRange};

pub const MIN_TOPIC_CHARS: usize = 3;
pub const MAX_TOPIC_CHARS: usize = 200;

const STRIPPED_CHARS: [char; 4] = ['<', '>', '"', '\''];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Topic is empty")]
    EmptyTopic,

    #[error("Topic too short ({0} chars, minimum {MIN_TOPIC_CHARS})")]
    TopicTooShort(usize),

    #[error("Topic too long ({0} chars, maximum {MAX_TOPIC_CHARS})")]
    TopicTooLong(usize),

    #[error("Unknown depth mode: {0}")]
    UnknownDepth(String),

    #[error("Unknown persona: {0}")]
    UnknownPersona(String),
}

/// 外部输入（CLI / UI 表单）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub topic: String,
    #[serde(default)]
    pub depth: DepthMode,
    #[serde(default)]
    pub persona: Persona,
    /// 用户手动勾选的来源
    #[serde(default)]
    pub plan: Option<Vec<String>>,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

impl ResearchRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn depth(mut self, depth: DepthMode) -> Self {
        self.depth = depth;
        self
    }

    pub fn persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn plan<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plan = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    /// 用字符串形式的深度 / 角色构造（CLI 输入）
    pub fn from_raw(
        topic: &str,
        depth: Option<&str>,
        persona: Option<&str>,
    ) -> Result<Self, RequestError> {
        let mut req = Self::new(topic);
        if let Some(d) = depth {
            req.depth = d.parse()?;
        }
        if let Some(p) = persona {
            req.persona = p.parse()?;
        }
        Ok(req)
    }

    /// 校验并清洗，返回可以交给 Orchestrator 的请求
    pub fn validate(mut self) -> Result<Self, RequestError> {
        let cleaned: String = self
            .topic
            .chars()
            .filter(|c| !STRIPPED_CHARS.contains(c))
            .collect();
        let cleaned = cleaned.trim().to_string();
        if cleaned.is_empty() {
            return Err(RequestError::EmptyTopic);
        }
        let len = cleaned.chars().count();
        if len < MIN_TOPIC_CHARS {
            return Err(RequestError::TopicTooShort(len));
        }
        if len > MAX_TOPIC_CHARS {
            return Err(RequestError::TopicTooLong(len));
        }
        self.topic = cleaned;
        if let Some(plan) = self.plan.take() {
            let deduped = Plan::from_ids(plan);
            self.plan = Some(deduped.iter().map(|s| s.as_str().to_string()).collect());
        }
        Ok(self)
    }

    /// 预置计划中不在已知来源里的 id（仍会执行，结果为空）
    pub fn unknown_sources(&self, known: &[SourceId]) -> Vec<String> {
        self.plan
            .iter()
            .flatten()
            .filter(|id| !known.iter().any(|k| k.as_str() == SourceId::new(id.as_str()).as_str()))
            .cloned()
            .collect()
    }

    /// 校验后构建初始状态
    pub fn into_state(self) -> Result<ResearchState, RequestError> {
        let req = self.validate()?;
        let mut state = ResearchState::new(req.topic)
            .with_depth(req.depth)
            .with_persona(req.persona)
            .with_time_range(req.time_range);
        if let Some(plan) = req.plan {
            state = state.with_pinned_plan(Plan::from_ids(plan));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_strips_and_trims() {
        let req = ResearchRequest::new("  <script>\"rust\" 'async'  ").validate().unwrap();
        assert_eq!(req.topic, "scriptrust async");
    }

    #[test]
    fn test_validate_length_bounds() {
        assert_eq!(ResearchRequest::new("   ").validate().unwrap_err(), RequestError::EmptyTopic);
        assert_eq!(ResearchRequest::new("ab").validate().unwrap_err(), RequestError::TopicTooShort(2));
        let long = "x".repeat(201);
        assert_eq!(ResearchRequest::new(long).validate().unwrap_err(), RequestError::TopicTooLong(201));
        assert!(ResearchRequest::new("x".repeat(200)).validate().is_ok());
        assert!(ResearchRequest::new("量子计算").validate().is_ok());
    }

    #[test]
    fn test_from_raw_parses_enums() {
        let req = ResearchRequest::from_raw("rust async", Some("quick"), Some("tech")).unwrap();
        assert_eq!(req.depth, DepthMode::Quick);
        assert_eq!(req.persona, Persona::Tech);
        assert!(matches!(
            ResearchRequest::from_raw("rust", Some("x"), None),
            Err(RequestError::UnknownDepth(_))
        ));
        assert!(matches!(
            ResearchRequest::from_raw("rust", None, Some("pirate")),
            Err(RequestError::UnknownPersona(_))
        ));
    }

    #[test]
    fn test_into_state_pins_deduped_plan() {
        let state = ResearchRequest::new("tokio runtime")
            .plan(["github", "so", "github"])
            .into_state()
            .unwrap();
        let pinned = state.pinned_plan.as_ref().unwrap();
        assert_eq!(pinned.len(), 2);
        assert_eq!(state.topic(), "tokio runtime");
    }

    #[test]
    fn test_unknown_sources() {
        let req = ResearchRequest::new("rust").plan(["wiki", "myspace"]);
        let known = vec![SourceId::new("wiki"), SourceId::new("web")];
        assert_eq!(req.unknown_sources(&known), vec!["myspace".to_string()]);
    }
}
