//! 研究层：规划、查询扩展、并行调度、综合、评估
//!
//! 每个推理步骤通过构造函数注入 Arc<dyn LlmClient>，在看门狗硬超时内调用；
//! 提示词带有 TASK 标记，便于脚本化客户端按阶段应答。

pub mod bibliography;
pub mod citations;
pub mod consolidator;
pub mod context;
pub mod dispatcher;
pub mod evaluator;
pub mod extraction;
pub mod persona;
pub mod planner;
pub mod quality;
pub mod translation;

use std::sync::Arc;
use std::time::Duration;

use crate::core::error::ResearchError;
use crate::core::watchdog::with_deadline;
use crate::llm::{LlmClient, Message};

pub use citations::CitationGuard;
pub use consolidator::{Consolidation, Consolidator, FAILURE_FALLBACK, NO_INFORMATION};
pub use dispatcher::{DispatchOutput, ParallelDispatcher};
pub use evaluator::{Evaluation, Evaluator, RefinementStrategy};
pub use planner::{PlanDecision, Planner};
pub use translation::QueryExpander;

/// 各推理步骤提示词中的任务标记
pub const TASK_SOURCE_SELECTION: &str = "TASK: SOURCE_SELECTION";
pub const TASK_QUERY_EXPANSION: &str = "TASK: QUERY_EXPANSION";
pub const TASK_CONSOLIDATED_REPORT: &str = "TASK: CONSOLIDATED_REPORT";
pub const TASK_SUFFICIENCY_REVIEW: &str = "TASK: SUFFICIENCY_REVIEW";

/// 在硬超时内完成一次推理调用；空回复视为错误
pub(crate) async fn reason(
    llm: &Arc<dyn LlmClient>,
    messages: Vec<Message>,
    limit: Duration,
) -> Result<String, ResearchError> {
    let llm = Arc::clone(llm);
    let reply = with_deadline(limit, async move { llm.complete(&messages).await }).await??;
    if reply.trim().is_empty() {
        return Err(ResearchError::Llm(crate::llm::LlmError::EmptyResponse));
    }
    Ok(reply)
}
