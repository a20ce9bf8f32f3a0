//! 错误类型
//!
//! SourceError 只在适配器边界内部出现（fetch 会把它转成空结果 + 警告日志）；
//! ResearchError 描述推理步骤与状态机的失败，由各阶段就地降级，不会冒出 Orchestrator::run。

use std::time::Duration;

use thiserror::Error;

use crate::core::Step;
use crate::llm::LlmError;

/// 单个信息源内部的失败（网络、解析、限流、未配置、缓存）
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Source not configured: {0}")]
    NotConfigured(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            if status.as_u16() == 429 {
                return SourceError::RateLimited;
            }
            return SourceError::Status(status.as_u16());
        }
        if e.is_decode() {
            return SourceError::Malformed(e.to_string());
        }
        SourceError::Request(e.to_string())
    }
}

impl From<rusqlite::Error> for SourceError {
    fn from(e: rusqlite::Error) -> Self {
        SourceError::Cache(e.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Malformed(e.to_string())
    }
}

/// 规划 / 综合 / 评估 / 状态机错误
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Reasoning step timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unparseable reasoning output: {0}")]
    Unparseable(String),

    #[error("Invalid transition {from:?} -> {to:?}")]
    InvalidTransition { from: Step, to: Step },

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(SourceError::Status(503).to_string(), "HTTP 503");
        assert_eq!(
            ResearchError::InvalidTransition {
                from: Step::Done,
                to: Step::Plan
            }
            .to_string(),
            "Invalid transition Done -> Plan"
        );
        let e: ResearchError = LlmError::Timeout.into();
        assert!(e.to_string().contains("timed out"));
    }
}
