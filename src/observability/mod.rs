//! 可观测性：日志初始化与进程内指标
//!
//! 日志：tracing + EnvFilter（默认 info，RUST_LOG 可覆盖）。
//! 指标：每个阶段 / 每个来源的计时与成功、失败计数，运行结束时可快照或写入日志。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 初始化日志；重复调用（例如测试中）静默忽略
pub fn init(default_level: &str) {
    let directive = default_level
        .parse::<tracing_subscriber::filter::Directive>()
        .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into());
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(directive))
        .with(fmt::layer())
        .try_init();
}

/// 单个操作的计时汇总（毫秒）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub count: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub total_ms: u64,
}

impl TimingSummary {
    fn record(&mut self, ms: u64) {
        if self.count == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
        }
        self.count += 1;
        self.total_ms += ms;
        self.avg_ms = self.total_ms as f64 / self.count as f64;
    }
}

/// 指标快照（随报告一起输出）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub errors: BTreeMap<String, u64>,
    pub timings: BTreeMap<String, TimingSummary>,
}

#[derive(Default)]
struct MetricsInner {
    counters: BTreeMap<String, u64>,
    errors: BTreeMap<String, u64>,
    timings: BTreeMap<String, TimingSummary>,
}

/// 进程内指标，克隆后共享同一份数据
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Mutex<MetricsInner>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.counters.entry(counter.to_string()).or_insert(0) += 1;
        }
    }

    /// 记录一次操作：耗时 + `<op>_success` / `<op>_error` 计数
    pub fn record(&self, operation: &str, elapsed: Duration, ok: bool) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner
            .timings
            .entry(operation.to_string())
            .or_default()
            .record(elapsed.as_millis() as u64);
        let suffix = if ok { "success" } else { "error" };
        *inner
            .counters
            .entry(format!("{}_{}", operation, suffix))
            .or_insert(0) += 1;
        if !ok {
            *inner.errors.entry(operation.to_string()).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        match self.inner.lock() {
            Ok(inner) => MetricsSnapshot {
                counters: inner.counters.clone(),
                errors: inner.errors.clone(),
                timings: inner.timings.clone(),
            },
            Err(_) => MetricsSnapshot::default(),
        }
    }

    pub fn log_stats(&self) {
        let snap = self.snapshot();
        for (op, t) in &snap.timings {
            tracing::info!(
                operation = %op,
                calls = t.count,
                avg_ms = format!("{:.1}", t.avg_ms),
                max_ms = t.max_ms,
                "Operation timing"
            );
        }
        if !snap.errors.is_empty() {
            tracing::warn!(errors = ?snap.errors, "Operation errors");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_timings_and_counters() {
        let m = Metrics::new();
        m.record("dispatch", Duration::from_millis(10), true);
        m.record("dispatch", Duration::from_millis(30), true);
        m.record("source.web", Duration::from_millis(5), false);
        m.increment("iterations");

        let snap = m.snapshot();
        let t = &snap.timings["dispatch"];
        assert_eq!(t.count, 2);
        assert_eq!(t.min_ms, 10);
        assert_eq!(t.max_ms, 30);
        assert_eq!(t.total_ms, 40);
        assert!((t.avg_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(snap.counters["dispatch_success"], 2);
        assert_eq!(snap.counters["source.web_error"], 1);
        assert_eq!(snap.errors["source.web"], 1);
        assert_eq!(snap.counters["iterations"], 1);
    }

    #[test]
    fn test_clones_share_data() {
        let m = Metrics::new();
        let c = m.clone();
        c.increment("x");
        assert_eq!(m.snapshot().counters["x"], 1);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init("info");
        init("debug");
    }
}
