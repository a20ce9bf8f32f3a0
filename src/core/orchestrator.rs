//! 研究编排器：主控状态机
//!
//! INIT → PLAN → DISPATCH → CONSOLIDATE → EVALUATE → {PLAN | DONE}
//!
//! 各阶段严格顺序执行，只有 DISPATCH 内部并发。每个阶段都有降级输出，run 本身不返回错误；
//! EVALUATE → PLAN 是唯一的回边，由 iteration_count 与上限约束。
//! 负责：从配置创建 LLM / 来源注册表 / 各组件（构造函数注入），驱动循环、合并结果、发出事件与记录指标。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ResearchSection};
use crate::core::events::{EventSink, PlanOrigin, ResearchEvent};
use crate::core::request::{RequestError, ResearchRequest};
use crate::core::state::{Cursor, ResearchState};
use crate::core::step::Step;
use crate::llm::{create_deepseek_client, create_ollama_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::observability::Metrics;
use crate::research::{
    Consolidator, Evaluator, ParallelDispatcher, Planner, QueryExpander, RefinementStrategy,
};
use crate::sources::{build_registry, SourceQuery, SourceRegistry};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Ollama / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.trim().to_lowercase();
    let model = cfg.llm.model.as_str();
    let request_timeout = Duration::from_secs(cfg.llm.timeouts.request.max(1));
    let has_deepseek_key = std::env::var("DEEPSEEK_API_KEY").is_ok();
    let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();

    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient)
        }
        "ollama" => {
            tracing::info!("Using Ollama LLM ({})", model);
            Arc::new(
                create_ollama_client(cfg.llm.base_url.as_deref(), Some(model))
                    .with_request_timeout(request_timeout),
            )
        }
        // 配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点
        "deepseek" if has_deepseek_key || has_openai_key => {
            tracing::info!("Using DeepSeek LLM ({})", model);
            Arc::new(create_deepseek_client(Some(model)).with_request_timeout(request_timeout))
        }
        "openai" if has_openai_key => {
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), model, None)
                    .with_request_timeout(request_timeout),
            )
        }
        other => {
            tracing::warn!(provider = %other, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 循环参数（来自 [research] 段）
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_iterations: u32,
    pub source_timeout: Duration,
    pub llm_timeout: Duration,
    pub max_concurrent_sources: usize,
    pub max_context_chars: usize,
    pub fallback_plan: Vec<String>,
    pub refinement: RefinementStrategy,
    pub expansion_languages: Vec<String>,
    pub verify_citations: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&ResearchSection::default())
    }
}

impl From<&ResearchSection> for OrchestratorSettings {
    fn from(section: &ResearchSection) -> Self {
        let refinement = section.refinement.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid refinement strategy, using 'all'");
            RefinementStrategy::AllGaps
        });
        Self {
            max_iterations: section.max_iterations,
            source_timeout: Duration::from_secs(section.source_timeout_secs.max(1)),
            llm_timeout: Duration::from_secs(section.llm_timeout_secs.max(1)),
            max_concurrent_sources: section.max_concurrent_sources.max(1),
            max_context_chars: section.max_context_chars,
            fallback_plan: section.fallback_plan.clone(),
            refinement,
            expansion_languages: section.expansion_languages.clone(),
            verify_citations: section.verify_citations,
        }
    }
}

/// Orchestrator 构建器：LLM 与注册表可注入（测试用假实现），也可整体从配置创建
#[derive(Default)]
pub struct OrchestratorBuilder {
    llm: Option<Arc<dyn LlmClient>>,
    registry: Option<SourceRegistry>,
    settings: OrchestratorSettings,
    events: EventSink,
    metrics: Option<Metrics>,
    cancel: Option<CancellationToken>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从配置创建 LLM、来源注册表与循环参数
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new()
            .llm(create_llm_from_config(cfg))
            .registry(build_registry(cfg))
            .settings(OrchestratorSettings::from(&cfg.research))
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn registry(mut self, registry: SourceRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn build(self) -> Orchestrator {
        let llm = self.llm.unwrap_or_else(|| Arc::new(MockLlmClient));
        let registry = self.registry.unwrap_or_default();
        let metrics = self.metrics.unwrap_or_default();
        let cancel = self.cancel.unwrap_or_default();
        let s = self.settings;

        let expander = QueryExpander::new(llm.clone(), s.expansion_languages.clone(), s.llm_timeout);
        let planner = Planner::new(llm.clone(), s.llm_timeout)
            .with_fallback(s.fallback_plan.iter().map(String::as_str))
            .with_expander(expander);
        let dispatcher = ParallelDispatcher::new(registry, s.source_timeout)
            .with_max_concurrent(s.max_concurrent_sources)
            .with_events(self.events.clone())
            .with_metrics(metrics.clone())
            .with_cancellation(cancel.clone());
        let consolidator = Consolidator::new(llm.clone(), s.llm_timeout)
            .with_max_context_chars(s.max_context_chars)
            .with_citation_check(s.verify_citations)
            .with_metrics(metrics.clone());
        let evaluator = Evaluator::new(llm.clone(), s.llm_timeout)
            .with_max_iterations(s.max_iterations)
            .with_strategy(s.refinement)
            .with_metrics(metrics.clone());

        Orchestrator {
            llm,
            planner,
            dispatcher,
            consolidator,
            evaluator,
            events: self.events,
            metrics,
            cancel,
            settings: s,
        }
    }
}

pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    planner: Planner,
    dispatcher: ParallelDispatcher,
    consolidator: Consolidator,
    evaluator: Evaluator,
    events: EventSink,
    metrics: Metrics,
    cancel: CancellationToken,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SourceRegistry {
        self.dispatcher.registry()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// 取消令牌：取消后当前阶段给出降级输出，随后直接进入 DONE
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 校验外部请求后运行；校验失败是唯一的错误出口
    pub async fn run_request(&self, request: ResearchRequest) -> Result<ResearchState, RequestError> {
        let request = request.validate()?;
        let unknown = request.unknown_sources(&self.registry().ids());
        if !unknown.is_empty() {
            tracing::warn!(unknown = ?unknown, "Pinned plan names unknown sources, they will yield empty results");
        }
        let state = request.into_state()?;
        Ok(self.run(state).await)
    }

    /// 运行完整研究循环；永不失败
    pub async fn run(&self, mut state: ResearchState) -> ResearchState {
        let started = Instant::now();
        state.normalize();
        tracing::info!(
            run_id = %state.run_id,
            topic = %state.topic(),
            persona = state.persona.as_str(),
            depth = ?state.depth_mode,
            "Research run started"
        );
        self.emit_step(&state);

        let mut next = Step::Plan;
        loop {
            if let Err(e) = state.enter(next) {
                tracing::error!(error = %e, "Invalid stage transition, finishing run");
                break;
            }
            self.emit_step(&state);

            next = match state.step {
                Step::Plan => {
                    self.plan_stage(&mut state).await;
                    Step::Dispatch
                }
                Step::Dispatch => {
                    self.dispatch_stage(&mut state).await;
                    Step::Consolidate
                }
                Step::Consolidate => {
                    self.consolidate_stage(&mut state).await;
                    Step::Evaluate
                }
                Step::Evaluate => self.evaluate_stage(&mut state).await,
                Step::Init | Step::Done => break,
            };

            if self.cancel.is_cancelled() && next != Step::Done {
                tracing::warn!(stage = state.step.as_str(), "Run cancelled, finishing");
                state.evaluation_reason = Some("cancelled".to_string());
                next = Step::Done;
            }
        }

        if !state.step.is_terminal() {
            // 转移表允许任一阶段直接进入 DONE
            let _ = state.enter(Step::Done);
            self.emit_step(&state);
        }

        let elapsed = started.elapsed();
        self.metrics.record("research_run", elapsed, true);
        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::info!(
            run_id = %state.run_id,
            iterations = state.iteration_count,
            records = state.total_records(),
            sufficient = state.sufficient,
            elapsed_ms = elapsed.as_millis() as u64,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "Research run finished"
        );
        self.events.emit(ResearchEvent::Finished {
            iterations: state.iteration_count,
        });
        state
    }

    fn emit_step(&self, state: &ResearchState) {
        self.events.emit(ResearchEvent::StepEntered {
            step: state.step,
            iteration: state.iteration_count,
        });
    }

    async fn plan_stage(&self, state: &mut ResearchState) {
        let started = Instant::now();
        let available = self.registry().available();
        let decision = self.planner.plan(state, &available).await;
        self.metrics
            .record("plan", started.elapsed(), decision.origin != PlanOrigin::Fallback);
        self.events.emit(ResearchEvent::PlanReady {
            sources: decision.plan.iter().map(|s| s.to_string()).collect(),
            origin: decision.origin,
        });
        state.apply_plan(decision.plan, decision.queries);
    }

    async fn dispatch_stage(&self, state: &mut ResearchState) {
        let query = SourceQuery::new(state.working_topic.clone(), state.max_results())
            .with_time_range(state.time_range)
            .with_variants(state.queries.clone());
        let output = self.dispatcher.dispatch(&state.plan, &query).await;
        output.merge_into(state);
        state.cursor = Cursor::End;
    }

    async fn consolidate_stage(&self, state: &mut ResearchState) {
        let consolidation = self.consolidator.consolidate(state).await;
        self.events.emit(ResearchEvent::Consolidated {
            chars: consolidation.synthesis.chars().count(),
            truncated: consolidation.truncated,
            stripped_urls: consolidation.stripped.len(),
        });
        if consolidation.is_fallback() {
            self.metrics.increment("synthesis_fallback");
        }
        state.synthesis = consolidation.synthesis;
        state.bibliography = consolidation.bibliography;
    }

    /// 返回下一阶段：PLAN（补充一轮）或 DONE
    async fn evaluate_stage(&self, state: &mut ResearchState) -> Step {
        let evaluation = self.evaluator.evaluate(state).await;
        self.events.emit(ResearchEvent::Evaluated {
            sufficient: evaluation.sufficient,
            reason: evaluation.reason.clone(),
            next_query: evaluation.next_query.clone(),
        });
        state.evaluation_reason = Some(evaluation.reason);

        match evaluation.next_query {
            Some(next_query)
                if !evaluation.sufficient && state.iteration_count < self.settings.max_iterations =>
            {
                state.working_topic = next_query;
                state.iteration_count += 1;
                tracing::info!(
                    iteration = state.iteration_count,
                    working_topic = %state.working_topic,
                    "Looping back to planning"
                );
                Step::Plan
            }
            _ => {
                state.sufficient = true;
                Step::Done
            }
        }
    }
}
