//! 研究过程事件：单向通知 UI / 进度展示方，不作为控制输入

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::step::Step;

/// 计划来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrigin {
    /// 调用方预置，第一轮原样执行
    Pinned,
    /// 推理步骤给出
    Reasoned,
    /// 推理失败后的固定计划
    Fallback,
}

/// 单个来源的抓取结局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    Ok,
    Error,
    Timeout,
    Unknown,
}

impl FetchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchOutcome::Ok => "ok",
            FetchOutcome::Error => "error",
            FetchOutcome::Timeout => "timeout",
            FetchOutcome::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// 进入某阶段
    StepEntered { step: Step, iteration: u32 },
    /// 本轮计划已确定
    PlanReady {
        sources: Vec<String>,
        origin: PlanOrigin,
    },
    /// 开始抓取某来源
    SourceStarted { source: String },
    /// 某来源抓取结束（成功、失败或超时）
    SourceFinished {
        source: String,
        records: usize,
        outcome: FetchOutcome,
        elapsed_ms: u64,
    },
    /// 综合完成
    Consolidated {
        chars: usize,
        truncated: bool,
        stripped_urls: usize,
    },
    /// 评估结果
    Evaluated {
        sufficient: bool,
        reason: String,
        next_query: Option<String>,
    },
    /// 运行结束
    Finished { iterations: u32 },
}

/// 可选的事件发送端；接收方掉线不影响研究流程
#[derive(Clone, Default)]
pub struct EventSink(Option<UnboundedSender<ResearchEvent>>);

impl EventSink {
    pub fn new(tx: UnboundedSender<ResearchEvent>) -> Self {
        Self(Some(tx))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: ResearchEvent) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(event);
        }
    }
}
