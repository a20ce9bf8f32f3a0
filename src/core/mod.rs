//! 核心编排层：研究状态与阶段转移、请求校验、事件、看门狗、主控循环

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod request;
pub mod state;
pub mod step;
pub mod watchdog;

pub use error::{ResearchError, SourceError};
pub use events::{EventSink, FetchOutcome, PlanOrigin, ResearchEvent};
pub use orchestrator::{create_llm_from_config, Orchestrator, OrchestratorBuilder, OrchestratorSettings};
pub use request::{RequestError, ResearchRequest};
pub use state::{
    Cursor, DepthMode, Persona, Plan, ResearchReport, ResearchState, ResultRecord, SourceId,
    SourceReliability, SourceType, TimeRange,
};
pub use step::Step;
pub use watchdog::{blocking_with_deadline, with_deadline, WatchdogError};
