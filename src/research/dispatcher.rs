//! ParallelDispatcher：并发执行计划中的所有来源
//!
//! 每个来源一个任务（JoinSet + Semaphore 限宽），各自在硬超时内完成；
//! 一个来源失败、超时或 panic 只影响自己的键。整体截止时间到达后，尚未返回的任务被放弃（abort），
//! 其键保持为空列表。本阶段不修改 ResearchState，合并由 Orchestrator 通过 DispatchOutput::merge_into 完成。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::events::{EventSink, FetchOutcome, ResearchEvent};
use crate::core::state::{Plan, ResearchState, ResultRecord, SourceId, SourceReliability};
use crate::observability::Metrics;
use crate::sources::{fetch_detailed, FetchReport, SourceQuery, SourceRegistry};

/// 调度结果：计划中的每个来源都有一个键
#[derive(Debug, Clone, Default)]
pub struct DispatchOutput {
    pub results: BTreeMap<SourceId, Vec<ResultRecord>>,
    /// 本轮成功抓取的来源的可靠性元数据
    pub reliability: BTreeMap<SourceId, SourceReliability>,
    pub outcomes: BTreeMap<SourceId, FetchOutcome>,
    pub elapsed: Duration,
}

impl DispatchOutput {
    pub fn total_records(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn count(&self, outcome: FetchOutcome) -> usize {
        self.outcomes.values().filter(|o| **o == outcome).count()
    }

    /// 追加到状态：结果按来源追加，可靠性只写第一次
    pub fn merge_into(self, state: &mut ResearchState) {
        for (source, records) in self.results {
            state.merge_results(source, records);
        }
        for (source, reliability) in self.reliability {
            state.record_reliability(source, reliability);
        }
    }
}

pub struct ParallelDispatcher {
    registry: SourceRegistry,
    source_timeout: Duration,
    max_concurrent: usize,
    events: EventSink,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl ParallelDispatcher {
    pub fn new(registry: SourceRegistry, source_timeout: Duration) -> Self {
        Self {
            registry,
            source_timeout,
            max_concurrent: 5,
            events: EventSink::none(),
            metrics: Metrics::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn source_timeout(&self) -> Duration {
        self.source_timeout
    }

    /// 池宽：计划长度与并发上限取小
    pub fn pool_width(&self, plan: &Plan) -> usize {
        plan.len().min(self.max_concurrent).max(1)
    }

    /// 整体截止时间：按池宽分批，每批最多一个单源超时，再加少量余量
    pub fn overall_deadline(&self, plan: &Plan) -> Duration {
        let width = self.pool_width(plan);
        let waves = plan.len().div_ceil(width).max(1) as u32;
        self.source_timeout * waves + Duration::from_millis(250)
    }

    /// 并发抓取计划中的所有来源；永不失败
    pub async fn dispatch(&self, plan: &Plan, query: &SourceQuery) -> DispatchOutput {
        let started = Instant::now();
        let mut output = DispatchOutput::default();
        if plan.is_empty() {
            tracing::info!("Empty plan, skipping dispatch");
            return output;
        }

        let width = self.pool_width(plan);
        let semaphore = Arc::new(Semaphore::new(width));
        let mut tasks: JoinSet<(SourceId, SourceReliability, FetchReport)> = JoinSet::new();

        for source in plan {
            // 每个计划中的来源都有键，未完成的保持空列表
            output.results.insert(source.clone(), Vec::new());

            let Some(adapter) = self.registry.get(source.as_str()) else {
                tracing::warn!(source = %source, "Unknown source in plan, leaving empty results");
                output.outcomes.insert(source.clone(), FetchOutcome::Unknown);
                self.metrics.increment("sources_unknown");
                self.events.emit(ResearchEvent::SourceFinished {
                    source: source.to_string(),
                    records: 0,
                    outcome: FetchOutcome::Unknown,
                    elapsed_ms: 0,
                });
                continue;
            };
            output.outcomes.insert(source.clone(), FetchOutcome::Timeout);

            let source = source.clone();
            let query = query.clone();
            let limit = self.source_timeout;
            let semaphore = Arc::clone(&semaphore);
            let events = self.events.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                events.emit(ResearchEvent::SourceStarted {
                    source: source.to_string(),
                });
                let reliability = adapter.reliability();
                let report = fetch_detailed(adapter, query, limit).await;
                (source, reliability, report)
            });
        }

        let deadline = tokio::time::Instant::now() + self.overall_deadline(plan);
        tracing::info!(
            sources = plan.len(),
            width,
            timeout_ms = self.source_timeout.as_millis() as u64,
            "Dispatching sources"
        );

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok((source, reliability, report))) => {
                            self.finish(&mut output, source, reliability, report);
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "Source task failed outside its boundary");
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(pending = tasks.len(), "Dispatch deadline reached, abandoning stragglers");
                    break;
                }
                _ = self.cancel.cancelled() => {
                    tracing::warn!(pending = tasks.len(), "Dispatch cancelled, abandoning pending sources");
                    break;
                }
            }
        }
        tasks.abort_all();

        for (source, outcome) in &output.outcomes {
            if *outcome == FetchOutcome::Timeout && output.results.get(source).is_some_and(Vec::is_empty) {
                self.metrics.increment("sources_abandoned");
            }
        }

        output.elapsed = started.elapsed();
        self.metrics.record("dispatch", output.elapsed, true);
        tracing::info!(
            records = output.total_records(),
            ok = output.count(FetchOutcome::Ok),
            failed = output.count(FetchOutcome::Error),
            timed_out = output.count(FetchOutcome::Timeout),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Dispatch finished"
        );
        output
    }

    fn finish(
        &self,
        output: &mut DispatchOutput,
        source: SourceId,
        reliability: SourceReliability,
        report: FetchReport,
    ) {
        let ok = report.is_ok();
        self.metrics
            .record(&format!("source.{}", source), report.elapsed, ok);
        self.events.emit(ResearchEvent::SourceFinished {
            source: source.to_string(),
            records: report.records.len(),
            outcome: report.outcome,
            elapsed_ms: report.elapsed.as_millis() as u64,
        });
        if ok {
            output.reliability.insert(source.clone(), reliability);
        }
        output.outcomes.insert(source.clone(), report.outcome);
        output.results.insert(source, report.records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::adapter::testing::{Behavior, FakeAdapter};

    fn record(title: &str, url: &str) -> ResultRecord {
        ResultRecord::new(title, "content").with_url(url)
    }

    fn registry(adapters: Vec<FakeAdapter>) -> SourceRegistry {
        let mut reg = SourceRegistry::new();
        for a in adapters {
            reg.register(a);
        }
        reg
    }

    #[tokio::test]
    async fn test_isolation_failure_and_panic() {
        let reg = registry(vec![
            FakeAdapter::new("wiki", Behavior::Records(vec![record("A", "http://a")])),
            FakeAdapter::new("web", Behavior::Fail),
            FakeAdapter::new("arxiv", Behavior::Panic),
            FakeAdapter::new("so", Behavior::Records(vec![record("B", "http://b"), record("C", "http://c")])),
        ]);
        let dispatcher = ParallelDispatcher::new(reg, Duration::from_secs(2));
        let plan = Plan::from_ids(["wiki", "web", "arxiv", "so"]);
        let out = dispatcher.dispatch(&plan, &SourceQuery::new("rust", 5)).await;

        assert_eq!(out.results["wiki"].len(), 1);
        assert_eq!(out.results["so"].len(), 2);
        assert!(out.results["web"].is_empty());
        assert!(out.results["arxiv"].is_empty());
        assert_eq!(out.outcomes["web"], FetchOutcome::Error);
        assert_eq!(out.outcomes["arxiv"], FetchOutcome::Error);
        assert!(out.reliability.contains_key("wiki"));
        assert!(!out.reliability.contains_key("web"));
    }

    #[tokio::test]
    async fn test_slow_source_times_out_promptly() {
        let limit = Duration::from_millis(200);
        let reg = registry(vec![
            FakeAdapter::new("wiki", Behavior::Records(vec![record("A", "http://a")])),
            FakeAdapter::new("web", Behavior::Sleep(limit * 2)),
        ]);
        let dispatcher = ParallelDispatcher::new(reg, limit);
        let started = Instant::now();
        let out = dispatcher
            .dispatch(&Plan::from_ids(["wiki", "web"]), &SourceQuery::new("rust", 5))
            .await;
        let elapsed = started.elapsed();

        assert!(elapsed < limit * 2, "dispatch took {:?}", elapsed);
        assert_eq!(out.results["wiki"][0].url.as_deref(), Some("http://a"));
        assert!(out.results["web"].is_empty());
        assert_eq!(out.outcomes["web"], FetchOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_unknown_source_gets_empty_key() {
        let reg = registry(vec![FakeAdapter::new("wiki", Behavior::Records(vec![]))]);
        let dispatcher = ParallelDispatcher::new(reg, Duration::from_secs(1));
        let out = dispatcher
            .dispatch(&Plan::from_ids(["wiki", "nowhere"]), &SourceQuery::new("rust", 5))
            .await;
        assert!(out.results["nowhere"].is_empty());
        assert_eq!(out.outcomes["nowhere"], FetchOutcome::Unknown);
        assert_eq!(out.outcomes["wiki"], FetchOutcome::Ok);
    }

    #[tokio::test]
    async fn test_empty_plan_returns_empty_map() {
        let dispatcher = ParallelDispatcher::new(SourceRegistry::new(), Duration::from_secs(1));
        let out = dispatcher.dispatch(&Plan::empty(), &SourceQuery::new("rust", 5)).await;
        assert!(out.results.is_empty());
    }

    #[tokio::test]
    async fn test_merge_appends_across_iterations() {
        let reg = registry(vec![FakeAdapter::new("wiki", Behavior::Records(vec![record("A", "http://a")]))]);
        let dispatcher = ParallelDispatcher::new(reg, Duration::from_secs(1));
        let plan = Plan::from_ids(["wiki"]);
        let mut state = ResearchState::new("rust");
        for _ in 0..2 {
            dispatcher
                .dispatch(&plan, &SourceQuery::new("rust", 5))
                .await
                .merge_into(&mut state);
        }
        assert_eq!(state.results_by_source["wiki"].len(), 2);
        assert_eq!(state.source_reliability.len(), 1);
    }

    #[tokio::test]
    async fn test_events_and_metrics_recorded() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let metrics = Metrics::new();
        let reg = registry(vec![FakeAdapter::new("wiki", Behavior::Records(vec![record("A", "http://a")]))]);
        let dispatcher = ParallelDispatcher::new(reg, Duration::from_secs(1))
            .with_events(EventSink::new(tx))
            .with_metrics(metrics.clone());
        dispatcher
            .dispatch(&Plan::from_ids(["wiki"]), &SourceQuery::new("rust", 5))
            .await;
        drop(dispatcher);

        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(serde_json::to_value(&ev).unwrap()["type"].as_str().unwrap().to_string());
        }
        assert_eq!(kinds, vec!["source_started", "source_finished"]);
        let snap = metrics.snapshot();
        assert_eq!(snap.timings["source.wiki"].count, 1);
        assert_eq!(snap.timings["dispatch"].count, 1);
    }

    #[tokio::test]
    async fn test_narrow_pool_completes_every_source() {
        let reg = registry(vec![
            FakeAdapter::new("wiki", Behavior::Records(vec![record("A", "http://a")])),
            FakeAdapter::new("web", Behavior::Records(vec![record("W", "http://w")])),
            FakeAdapter::new("so", Behavior::Records(vec![record("S", "http://s")])),
        ]);
        let dispatcher = ParallelDispatcher::new(reg, Duration::from_millis(500)).with_max_concurrent(1);
        let plan = Plan::from_ids(["wiki", "web", "so"]);
        assert_eq!(dispatcher.pool_width(&plan), 1);

        let out = dispatcher.dispatch(&plan, &SourceQuery::new("rust", 5)).await;
        assert_eq!(out.results.len(), 3);
        for id in ["wiki", "web", "so"] {
            assert_eq!(out.results[id].len(), 1, "{} missing results", id);
            assert_eq!(out.outcomes[id], FetchOutcome::Ok);
        }
        assert_eq!(out.reliability.len(), 3);
    }

    #[tokio::test]
    async fn test_slow_first_wave_does_not_starve_second_wave() {
        let limit = Duration::from_millis(200);
        let reg = registry(vec![
            FakeAdapter::new("web", Behavior::Sleep(limit * 5)),
            FakeAdapter::new("wiki", Behavior::Records(vec![record("A", "http://a")])),
        ]);
        let dispatcher = ParallelDispatcher::new(reg, limit).with_max_concurrent(1);
        let plan = Plan::from_ids(["web", "wiki"]);

        let started = Instant::now();
        let out = dispatcher.dispatch(&plan, &SourceQuery::new("rust", 5)).await;
        let elapsed = started.elapsed();

        assert!(elapsed < dispatcher.overall_deadline(&plan), "dispatch took {:?}", elapsed);
        assert_eq!(out.outcomes["web"], FetchOutcome::Timeout);
        assert!(out.results["web"].is_empty());
        assert_eq!(out.outcomes["wiki"], FetchOutcome::Ok);
        assert_eq!(out.results["wiki"], vec![record("A", "http://a")]);
    }

    #[test]
    fn test_pool_width_and_deadline() {
        let dispatcher = ParallelDispatcher::new(SourceRegistry::new(), Duration::from_secs(10))
            .with_max_concurrent(2);
        let plan = Plan::from_ids(["a", "b", "c"]);
        assert_eq!(dispatcher.pool_width(&plan), 2);
        assert_eq!(dispatcher.overall_deadline(&plan), Duration::from_millis(20_250));
        assert_eq!(dispatcher.pool_width(&Plan::from_ids(["a"])), 1);
    }
}
