//! 信息源适配器契约
//!
//! 所有来源实现 SourceAdapter（id / description / reliability / search）。
//! 调用方不直接调用 search，而是经由 fetch：在硬超时内运行、捕获错误与 panic、按 max_results 截断，
//! 失败或超时一律返回空列表并输出 warn 日志；每次调用输出一条 JSON 审计日志。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::core::error::SourceError;
use crate::core::events::FetchOutcome;
use crate::core::state::{ResultRecord, SourceReliability, TimeRange};
use crate::core::watchdog::{with_deadline, WatchdogError};

/// 一次检索的输入
#[derive(Clone, Debug, Default)]
pub struct SourceQuery {
    /// 当前检索主题（可能是评估给出的补充查询）
    pub text: String,
    pub max_results: usize,
    pub time_range: Option<TimeRange>,
    /// 语言 → 查询变体，仅作参考
    pub variants: BTreeMap<String, String>,
}

impl SourceQuery {
    pub fn new(text: impl Into<String>, max_results: usize) -> Self {
        Self {
            text: text.into(),
            max_results,
            ..Default::default()
        }
    }

    pub fn with_time_range(mut self, range: Option<TimeRange>) -> Self {
        self.time_range = range;
        self
    }

    pub fn with_variants(mut self, variants: BTreeMap<String, String>) -> Self {
        self.variants = variants;
        self
    }

    /// 指定语言的查询变体，没有则回退到主题本身
    pub fn preferred(&self, lang: &str) -> &str {
        self.variants
            .get(lang)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(&self.text)
    }
}

/// 信息源适配器
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// 来源标识（计划中使用的 id）
    fn id(&self) -> &str;

    /// 来源描述（供规划推理理解用途）
    fn description(&self) -> &str;

    fn reliability(&self) -> SourceReliability;

    /// 是否可用（缺少 API Key、知识库为空时为 false）
    fn is_available(&self) -> bool {
        true
    }

    /// 实际检索；错误由 fetch 统一降级
    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError>;
}

/// fetch 的详细结果（调度器用于事件、指标与可靠性写入）
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub records: Vec<ResultRecord>,
    pub outcome: FetchOutcome,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl FetchReport {
    pub fn is_ok(&self) -> bool {
        self.outcome == FetchOutcome::Ok
    }
}

/// 在 time_limit 内执行一次检索，永不返回错误
pub async fn fetch_detailed(
    adapter: Arc<dyn SourceAdapter>,
    query: SourceQuery,
    time_limit: Duration,
) -> FetchReport {
    let start = Instant::now();
    let source = adapter.id().to_string();
    let max_results = query.max_results;
    let query_preview = preview(&query.text);

    let worker = adapter.clone();
    let result = with_deadline(time_limit, async move { worker.search(&query).await }).await;

    let (records, outcome, error) = match result {
        Ok(Ok(mut records)) => {
            records.truncate(max_results);
            (records, FetchOutcome::Ok, None)
        }
        Ok(Err(e)) => (Vec::new(), FetchOutcome::Error, Some(e.to_string())),
        Err(WatchdogError::TimedOut(d)) => (
            Vec::new(),
            FetchOutcome::Timeout,
            Some(format!("timed out after {} ms", d.as_millis())),
        ),
        Err(e) => (Vec::new(), FetchOutcome::Error, Some(e.to_string())),
    };
    let elapsed = start.elapsed();

    if let Some(ref err) = error {
        tracing::warn!(
            source = %source,
            outcome = outcome.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            error = %err,
            "Source fetch failed, continuing with empty results"
        );
    }

    let audit = serde_json::json!({
        "event": "source_audit",
        "source": source,
        "ok": outcome == FetchOutcome::Ok,
        "outcome": outcome.as_str(),
        "records": records.len(),
        "duration_ms": elapsed.as_millis() as u64,
        "query_preview": query_preview,
    });
    tracing::info!(audit = %audit.to_string(), "source");

    FetchReport {
        records,
        outcome,
        elapsed,
        error,
    }
}

/// 契约形式：query + max_results + time_limit → 记录列表（失败为空）
pub async fn fetch(
    adapter: Arc<dyn SourceAdapter>,
    query: SourceQuery,
    time_limit: Duration,
) -> Vec<ResultRecord> {
    fetch_detailed(adapter, query, time_limit).await.records
}

fn preview(s: &str) -> String {
    if s.chars().count() > 120 {
        format!("{}...", s.chars().take(120).collect::<String>())
    } else {
        s.to_string()
    }
}
