//! 硬超时看门狗
//!
//! 被看护的工作在独立任务中运行，调用方只等到截止时间为止：
//! - 异步工作：超时后 abort 任务，结果丢弃
//! - 阻塞工作（spawn_blocking）：线程无法强制终止，超时后放弃等待，后台完成的结果直接丢弃
//!
//! 被放弃的工作只拥有自己的数据，无法再写回共享状态。

use std::any::Any;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;

use crate::core::error::{ResearchError, SourceError};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    #[error("Deadline of {0:?} exceeded")]
    TimedOut(Duration),

    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task cancelled")]
    Cancelled,
}

impl From<WatchdogError> for ResearchError {
    fn from(e: WatchdogError) -> Self {
        match e {
            WatchdogError::TimedOut(d) => ResearchError::Timeout(d),
            other => ResearchError::TaskFailed(other.to_string()),
        }
    }
}

impl From<WatchdogError> for SourceError {
    fn from(e: WatchdogError) -> Self {
        SourceError::Request(e.to_string())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn join_error(e: JoinError) -> WatchdogError {
    if e.is_panic() {
        WatchdogError::Panicked(panic_message(e.into_panic()))
    } else {
        WatchdogError::Cancelled
    }
}

/// 在截止时间内运行异步工作；超时即 abort，panic 转为错误
pub async fn with_deadline<F, T>(limit: Duration, fut: F) -> Result<T, WatchdogError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::spawn(fut);
    match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(join_error(e)),
        Err(_) => {
            handle.abort();
            Err(WatchdogError::TimedOut(limit))
        }
    }
}

/// 在截止时间内运行阻塞工作；超时后放弃（线程可能继续跑完，结果被丢弃）
pub async fn blocking_with_deadline<F, T>(limit: Duration, f: F) -> Result<T, WatchdogError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(join_error(e)),
        Err(_) => {
            tracing::debug!(limit_ms = limit.as_millis() as u64, "Abandoning blocking task");
            Err(WatchdogError::TimedOut(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let v = with_deadline(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(v, Ok(7));
    }

    #[tokio::test]
    async fn test_times_out_and_aborts() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let start = Instant::now();
        let r = with_deadline(Duration::from_millis(50), async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert_eq!(r, Err(WatchdogError::TimedOut(Duration::from_millis(50))));
        assert!(start.elapsed() < Duration::from_millis(400));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let r: Result<(), _> = with_deadline(Duration::from_secs(1), async {
            panic!("adapter exploded");
        })
        .await;
        assert_eq!(r, Err(WatchdogError::Panicked("adapter exploded".into())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_work_is_abandoned() {
        let start = Instant::now();
        let r = blocking_with_deadline(Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_millis(400));
            1
        })
        .await;
        assert!(matches!(r, Err(WatchdogError::TimedOut(_))));
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_into_research_error() {
        let e: ResearchError = WatchdogError::TimedOut(Duration::from_secs(2)).into();
        assert!(matches!(e, ResearchError::Timeout(d) if d == Duration::from_secs(2)));
    }
}
