//! 信息源层：适配器契约、注册表与各来源实现
//!
//! 每个来源实现 SourceAdapter；build_registry 根据配置构建全部来源（共享一个 HTTP 客户端），
//! 配置了 cache_path 时用 CachedAdapter 包装。

pub mod adapter;
pub mod arxiv;
pub mod cache;
pub mod github;
pub mod hackernews;
pub mod http;
pub mod local_docs;
pub mod reddit;
pub mod registry;
pub mod scholar;
pub mod stackoverflow;
pub mod tavily;
pub mod tokenizer;
pub mod web;
pub mod wikipedia;
pub mod youtube;

use std::sync::Arc;
use std::time::Duration;

pub use adapter::{fetch, fetch_detailed, FetchReport, SourceAdapter, SourceQuery};
pub use cache::{CachedAdapter, ResponseCache};
pub use local_docs::{KnowledgeBase, LocalDocsSource};
pub use registry::SourceRegistry;

use crate::config::AppConfig;
use crate::core::state::SourceId;

/// 按配置构建全部来源；未在 enabled 白名单中的来源不注册
pub fn build_registry(cfg: &AppConfig) -> SourceRegistry {
    let sources = &cfg.sources;
    let client = http::build_client(Duration::from_secs(cfg.research.source_timeout_secs.max(1)));
    let max_chars = sources.max_content_chars;
    let tavily = sources
        .tavily_key()
        .map(|key| tavily::TavilyClient::new(client.clone(), key));

    let kb_db = sources
        .knowledge_base_dir
        .join(".index")
        .join("rag_cache.db");

    let all: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(wikipedia::WikipediaSource::new(client.clone(), max_chars)),
        Arc::new(web::WebSource::new(client.clone(), tavily.clone(), max_chars)),
        Arc::new(arxiv::ArxivSource::new(client.clone(), max_chars)),
        Arc::new(scholar::ScholarSource::new(client.clone(), max_chars)),
        Arc::new(github::GithubSource::new(client.clone(), sources.github_token(), max_chars)),
        Arc::new(hackernews::HackerNewsSource::new(client.clone(), max_chars)),
        Arc::new(stackoverflow::StackOverflowSource::new(client.clone(), max_chars)),
        Arc::new(reddit::RedditSource::new(client.clone(), tavily, max_chars)),
        Arc::new(youtube::YoutubeSource::new(client, sources.youtube_key(), max_chars)),
        Arc::new(
            LocalDocsSource::new(KnowledgeBase::new(&sources.knowledge_base_dir, kb_db), max_chars)
                .with_index_timeout(Duration::from_secs(cfg.research.source_timeout_secs.max(1))),
        ),
    ];

    let mut registry = SourceRegistry::new();
    for adapter in all {
        if sources.is_enabled(adapter.id()) {
            registry.register_arc(adapter);
        } else {
            tracing::debug!(source = adapter.id(), "Source disabled by configuration");
        }
    }

    match &sources.cache_path {
        Some(path) => {
            let cache = Arc::new(ResponseCache::new(
                path,
                Duration::from_secs(sources.cache_ttl_hours * 3600),
            ));
            match cache.purge_expired() {
                Ok(n) if n > 0 => tracing::info!(purged = n, "Purged expired cache entries"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Response cache unavailable"),
            }
            registry.wrap_all(|inner| -> Arc<dyn SourceAdapter> {
                // 本地知识库有自己的增量索引
                if inner.id() == SourceId::LOCAL_RAG {
                    inner
                } else {
                    Arc::new(CachedAdapter::new(inner, cache.clone()))
                }
            })
        }
        None => registry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registry_registers_all_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.sources.knowledge_base_dir = dir.path().join("kb");
        cfg.sources.youtube_api_key = None;
        let registry = build_registry(&cfg);
        for id in [
            SourceId::WIKI,
            SourceId::WEB,
            SourceId::ARXIV,
            SourceId::SCHOLAR,
            SourceId::GITHUB,
            SourceId::HN,
            SourceId::SO,
            SourceId::REDDIT,
            SourceId::YOUTUBE,
            SourceId::LOCAL_RAG,
        ] {
            assert!(registry.contains(id), "{id} missing");
        }
        // 知识库为空
        assert!(!registry.is_available(SourceId::LOCAL_RAG));
    }

    #[test]
    fn test_build_registry_respects_allow_list_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.sources.enabled = Some(vec!["wiki".into(), "arxiv".into()]);
        cfg.sources.cache_path = Some(dir.path().join("cache.db"));
        let registry = build_registry(&cfg);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("arxiv"));
        assert!(!registry.contains("web"));
    }
}
