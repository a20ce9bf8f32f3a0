//! Forager - Rust 多源研究智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 研究状态、阶段转移表、请求校验、事件、看门狗、主控循环
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Ollama / Mock）
//! - **observability**: 日志初始化与进程内指标
//! - **research**: 规划、查询扩展、并行调度、综合、评估
//! - **sources**: 信息源适配器契约、注册表与各来源实现

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod research;
pub mod sources;

pub use crate::core::{Orchestrator, OrchestratorBuilder, ResearchReport, ResearchRequest, ResearchState};
