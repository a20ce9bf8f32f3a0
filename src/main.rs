//! Forager - 多源研究智能体
//!
//! 入口：初始化日志、加载配置、从配置构建编排器，运行一次研究并输出报告 JSON。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use forager::config::load_config;
use forager::core::{OrchestratorBuilder, ResearchRequest, TimeRange};
use forager::observability;

#[derive(Parser, Debug)]
#[command(name = "forager", version, about = "Multi-source research agent")]
struct Cli {
    /// Research topic
    topic: String,

    /// quick / standard / deep
    #[arg(long)]
    depth: Option<String>,

    /// general / business / tech / academic / pm / news_editor
    #[arg(long)]
    persona: Option<String>,

    /// Comma-separated source ids used verbatim for the first pass
    #[arg(long, value_delimiter = ',')]
    sources: Option<Vec<String>>,

    /// Only consider results from the last 24 hours
    #[arg(long)]
    last_24h: bool,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        eprintln!("Config load failed ({}), using defaults", e);
        forager::config::AppConfig::default()
    });
    observability::init(&cfg.app.log_level);

    let depth = cli.depth.as_deref().unwrap_or(&cfg.research.default_depth);
    let persona = cli.persona.as_deref().unwrap_or(&cfg.research.default_persona);
    let mut request = ResearchRequest::from_raw(&cli.topic, Some(depth), Some(persona))
        .context("Invalid research request")?;
    if let Some(sources) = cli.sources {
        request = request.plan(sources);
    }
    if cli.last_24h {
        request = request.time_range(TimeRange::Day);
    }

    let orchestrator = OrchestratorBuilder::from_config(&cfg).build();

    // Ctrl-C：当前阶段给出降级输出后结束
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let state = orchestrator
        .run_request(request)
        .await
        .context("Invalid research request")?;
    orchestrator.metrics().log_stats();

    let report = state.report(Some(orchestrator.metrics().snapshot()));
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );
    Ok(())
}
