//! 研究循环集成测试：脚本化 LLM + 假来源，覆盖隔离、超时、循环上限、预置计划与引用校验

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use forager::core::{
    EventSink, FetchOutcome, OrchestratorSettings, Plan, ResearchEvent, ResearchRequest,
    ResearchState, ResultRecord, SourceError, SourceReliability, SourceType, Step,
};
use forager::llm::{LlmClient, MockLlmClient, ScriptedLlmClient, ScriptedReply};
use forager::research::{
    ParallelDispatcher, NO_INFORMATION, TASK_CONSOLIDATED_REPORT, TASK_SOURCE_SELECTION,
    TASK_SUFFICIENCY_REVIEW,
};
use forager::sources::{SourceAdapter, SourceQuery, SourceRegistry};
use forager::Orchestrator;
use regex::Regex;

enum Mode {
    Records(Vec<ResultRecord>),
    Fail,
    Panic,
    Sleep(Duration),
}

struct StubSource {
    id: &'static str,
    mode: Mode,
    calls: AtomicUsize,
}

impl StubSource {
    fn new(id: &'static str, mode: Mode) -> Self {
        Self {
            id,
            mode,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for StubSource {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        "stub source"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(4, SourceType::Encyclopedic)
    }

    async fn search(&self, _query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            Mode::Records(r) => Ok(r.clone()),
            Mode::Fail => Err(SourceError::Request("connection reset".into())),
            Mode::Panic => panic!("stub source exploded"),
            Mode::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(vec![ResultRecord::new("late", "late").with_url("http://late")])
            }
        }
    }
}

fn record(title: &str, url: &str) -> ResultRecord {
    ResultRecord::new(title, format!("{} content", title)).with_url(url)
}

fn settings(max_iterations: u32, source_timeout: Duration) -> OrchestratorSettings {
    OrchestratorSettings {
        max_iterations,
        source_timeout,
        llm_timeout: Duration::from_secs(2),
        expansion_languages: Vec::new(),
        ..OrchestratorSettings::default()
    }
}

fn orchestrator(
    llm: Arc<dyn LlmClient>,
    sources: Vec<StubSource>,
    settings: OrchestratorSettings,
    events: EventSink,
) -> Orchestrator {
    let mut registry = SourceRegistry::new();
    for s in sources {
        registry.register(s);
    }
    Orchestrator::builder()
        .llm(llm)
        .registry(registry)
        .settings(settings)
        .events(events)
        .build()
}

const SUFFICIENT: &str = "{\"sufficient\": true, \"gaps\": [], \"reasoning\": \"well supported\"}";
const INSUFFICIENT: &str =
    "{\"sufficient\": false, \"gaps\": [\"X\"], \"fact_check_queries\": [], \"reasoning\": \"needs more\"}";

#[tokio::test]
async fn test_one_failing_source_does_not_affect_siblings() {
    let mut registry = SourceRegistry::new();
    registry.register(StubSource::new("wiki", Mode::Records(vec![record("A", "http://a")])));
    registry.register(StubSource::new("web", Mode::Fail));
    registry.register(StubSource::new("arxiv", Mode::Panic));
    registry.register(StubSource::new("hn", Mode::Sleep(Duration::from_secs(5))));
    registry.register(StubSource::new(
        "so",
        Mode::Records(vec![record("B", "http://b"), record("C", "http://c")]),
    ));
    let dispatcher = ParallelDispatcher::new(registry, Duration::from_millis(200));

    let out = dispatcher
        .dispatch(
            &Plan::from_ids(["wiki", "web", "arxiv", "hn", "so"]),
            &SourceQuery::new("rust", 5),
        )
        .await;

    assert_eq!(out.results.len(), 5);
    assert_eq!(out.results["wiki"], vec![record("A", "http://a")]);
    assert_eq!(out.results["so"].len(), 2);
    for failed in ["web", "arxiv", "hn"] {
        assert!(out.results[failed].is_empty(), "{} should be empty", failed);
    }
    assert_eq!(out.outcomes["hn"], FetchOutcome::Timeout);
    assert_eq!(out.outcomes["web"], FetchOutcome::Error);
}

#[tokio::test]
async fn test_timeout_is_enforced_by_dispatcher() {
    let limit = Duration::from_millis(300);
    let mut registry = SourceRegistry::new();
    registry.register(StubSource::new("web", Mode::Sleep(limit * 2)));
    let dispatcher = ParallelDispatcher::new(registry, limit);

    let started = Instant::now();
    let out = dispatcher
        .dispatch(&Plan::from_ids(["web"]), &SourceQuery::new("rust", 5))
        .await;
    let elapsed = started.elapsed();

    assert!(out.results["web"].is_empty());
    assert!(elapsed >= limit);
    assert!(elapsed < limit * 3 / 2, "dispatch took {:?}", elapsed);
}

#[tokio::test]
async fn test_two_sources_one_slow() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .on(TASK_SUFFICIENCY_REVIEW, ScriptedReply::text(SUFFICIENT))
            .on(TASK_CONSOLIDATED_REPORT, ScriptedReply::text("<report>## A\n- [A](http://a)</report>")),
    );
    let orch = orchestrator(
        llm,
        vec![
            StubSource::new("wiki", Mode::Records(vec![record("A", "http://a")])),
            StubSource::new("web", Mode::Sleep(Duration::from_millis(600))),
        ],
        settings(1, Duration::from_millis(200)),
        EventSink::none(),
    );

    let state = orch
        .run_request(ResearchRequest::new("rust ownership").plan(["wiki", "web"]))
        .await
        .unwrap();

    let keys: Vec<&str> = state.results_by_source.keys().map(|k| k.as_str()).collect();
    assert_eq!(keys, vec!["web", "wiki"]);
    assert_eq!(state.results_by_source["wiki"].len(), 1);
    assert_eq!(state.results_by_source["wiki"][0].title, "A");
    assert_eq!(state.results_by_source["wiki"][0].url.as_deref(), Some("http://a"));
    assert!(state.results_by_source["web"].is_empty());
    assert!(state.source_reliability.contains_key("wiki"));
    assert!(!state.source_reliability.contains_key("web"));
}

#[tokio::test]
async fn test_pinned_plan_is_used_without_planning_call() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .on(TASK_SOURCE_SELECTION, ScriptedReply::text("[\"web\"]"))
            .on(TASK_SUFFICIENCY_REVIEW, ScriptedReply::text(SUFFICIENT))
            .otherwise(ScriptedReply::text("<report>done</report>")),
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let orch = orchestrator(
        llm.clone(),
        vec![
            StubSource::new("wiki", Mode::Records(vec![record("A", "http://a")])),
            StubSource::new("web", Mode::Records(vec![record("W", "http://w")])),
        ],
        settings(1, Duration::from_secs(1)),
        EventSink::new(tx),
    );

    let state = orch
        .run(ResearchState::new("rust").with_pinned_plan(Plan::from_ids(["wiki"])))
        .await;
    drop(orch);

    assert_eq!(llm.hits(TASK_SOURCE_SELECTION), 0);
    assert_eq!(state.plan, Plan::from_ids(["wiki"]));
    assert!(!state.results_by_source.contains_key("web"));

    let mut origin = None;
    while let Some(ev) = rx.recv().await {
        if let ResearchEvent::PlanReady { origin: o, sources } = ev {
            assert_eq!(sources, vec!["wiki".to_string()]);
            origin = Some(o);
        }
    }
    assert_eq!(origin, Some(forager::core::PlanOrigin::Pinned));
}

#[tokio::test]
async fn test_empty_plan_yields_no_information() {
    let llm = Arc::new(ScriptedLlmClient::new().on(TASK_SUFFICIENCY_REVIEW, ScriptedReply::text(SUFFICIENT)));
    let orch = orchestrator(
        llm.clone(),
        vec![StubSource::new("wiki", Mode::Records(vec![record("A", "http://a")]))],
        settings(1, Duration::from_secs(1)),
        EventSink::none(),
    );

    let state = orch
        .run_request(ResearchRequest::new("nothing to see").plan(Vec::<String>::new()))
        .await
        .unwrap();

    assert!(state.results_by_source.is_empty());
    assert_eq!(state.synthesis, NO_INFORMATION);
    assert!(state.bibliography.is_empty());
    assert_eq!(llm.hits(TASK_CONSOLIDATED_REPORT), 0);
    assert_eq!(state.step, Step::Done);
}

#[tokio::test]
async fn test_persistent_insufficiency_runs_exactly_two_cycles() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .on(TASK_SUFFICIENCY_REVIEW, ScriptedReply::text(INSUFFICIENT))
            .on(TASK_SOURCE_SELECTION, ScriptedReply::text("[\"wiki\"]"))
            .otherwise(ScriptedReply::text("<report>## Findings\n- text</report>")),
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let wiki = StubSource::new("wiki", Mode::Records(vec![record("A", "http://a")]));
    let orch = orchestrator(
        llm.clone(),
        vec![wiki],
        settings(1, Duration::from_secs(1)),
        EventSink::new(tx),
    );

    let state = orch.run(ResearchState::new("quantum consensus")).await;
    drop(orch);

    assert_eq!(state.iteration_count, 1);
    assert!(state.sufficient);
    assert_eq!(state.step, Step::Done);
    assert_eq!(state.topic(), "quantum consensus");
    assert_eq!(state.working_topic, "VERIFY AND DEEPEN: X");
    // 结果跨轮追加
    assert_eq!(state.results_by_source["wiki"].len(), 2);
    assert_eq!(llm.hits(TASK_SUFFICIENCY_REVIEW), 1);
    assert_eq!(llm.hits(TASK_SOURCE_SELECTION), 2);

    let mut evaluations = 0;
    while let Some(ev) = rx.recv().await {
        if let ResearchEvent::StepEntered { step: Step::Evaluate, .. } = ev {
            evaluations += 1;
        }
    }
    assert_eq!(evaluations, 2);
}

#[tokio::test]
async fn test_loop_is_bounded_by_ceiling() {
    for ceiling in [0u32, 2, 3] {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on(TASK_SUFFICIENCY_REVIEW, ScriptedReply::text(INSUFFICIENT))
                .on(TASK_SOURCE_SELECTION, ScriptedReply::text("[\"wiki\"]"))
                .otherwise(ScriptedReply::text("<report>text</report>")),
        );
        let orch = orchestrator(
            llm.clone(),
            vec![StubSource::new("wiki", Mode::Records(vec![record("A", "http://a")]))],
            settings(ceiling, Duration::from_secs(1)),
            EventSink::none(),
        );
        let state = orch.run(ResearchState::new("bounded loop")).await;

        assert_eq!(state.iteration_count, ceiling);
        assert!(state.sufficient);
        assert_eq!(state.results_by_source["wiki"].len(), ceiling as usize + 1);
        assert_eq!(llm.hits(TASK_SUFFICIENCY_REVIEW), ceiling as usize);
    }
}

#[tokio::test]
async fn test_echoed_synthesis_only_cites_record_urls() {
    let sources = vec![
        StubSource::new(
            "wiki",
            Mode::Records(vec![
                record("Rust", "https://en.wikipedia.org/wiki/Rust_(programming_language)"),
                ResultRecord::new("Notes", "See https://fabricated.example/paper for details."),
            ]),
        ),
        StubSource::new("web", Mode::Records(vec![record("Blog", "https://blog.example/post")])),
    ];
    let orch = orchestrator(
        Arc::new(MockLlmClient),
        sources,
        settings(1, Duration::from_secs(1)),
        EventSink::none(),
    );

    let state = orch
        .run(ResearchState::new("rust").with_pinned_plan(Plan::from_ids(["wiki", "web"])))
        .await;

    let allowed: BTreeSet<String> = state
        .results_by_source
        .values()
        .flatten()
        .filter_map(|r| r.url.clone())
        .collect();
    let url_re = Regex::new(r"https?://[^\s<>\[\]]+").unwrap();
    let found: Vec<&str> = url_re.find_iter(&state.synthesis).map(|m| m.as_str()).collect();

    assert!(!found.is_empty());
    for url in found {
        assert!(allowed.contains(url), "fabricated url in synthesis: {}", url);
    }
    assert!(!state.synthesis.contains("fabricated.example"));
    assert!(state.synthesis.contains("https://blog.example/post"));
}

#[tokio::test]
async fn test_topic_is_preserved_through_refinement() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .on(TASK_SUFFICIENCY_REVIEW, ScriptedReply::text(INSUFFICIENT))
            .on(TASK_SOURCE_SELECTION, ScriptedReply::text("not a list"))
            .otherwise(ScriptedReply::text("<report>r</report>")),
    );
    let orch = orchestrator(
        llm,
        vec![
            StubSource::new("wiki", Mode::Records(vec![record("A", "http://a")])),
            StubSource::new("web", Mode::Records(vec![record("W", "http://w")])),
        ],
        settings(1, Duration::from_secs(1)),
        EventSink::none(),
    );
    let state = orch.run(ResearchState::new("original framing")).await;

    // 规划输出无法解析：两轮都使用回退计划 wiki + web
    assert_eq!(state.plan, Plan::from_ids(["wiki", "web"]));
    assert_eq!(state.results_by_source["web"].len(), 2);
    assert_eq!(state.report(None).topic, "original framing");
}
