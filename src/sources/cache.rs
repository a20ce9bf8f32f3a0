//! 响应缓存：包装任意适配器，按 (来源, 查询, 上限, 时间范围, 查询变体) 缓存结果
//!
//! 超过 TTL 的条目视为不存在并被清除；空结果与错误不缓存；缓存自身的任何失败都不影响检索。
//! 与知识库索引一样，每次操作使用独立的短连接并在阻塞线程池中执行。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::core::error::SourceError;
use crate::core::state::{ResultRecord, SourceReliability};
use crate::sources::adapter::{SourceAdapter, SourceQuery};

#[derive(Debug, Clone)]
pub struct ResponseCache {
    path: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    fn open(&self) -> Result<Connection, SourceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );",
        )?;
        Ok(conn)
    }

    /// 查询变体按语言排序后参与键值，同一文本的不同扩展互不命中
    pub fn key(source: &str, query: &SourceQuery) -> String {
        let variants = if query.variants.is_empty() {
            "-".to_string()
        } else {
            query
                .variants
                .iter()
                .map(|(lang, text)| format!("{}={}", lang, text.trim().to_lowercase()))
                .collect::<Vec<_>>()
                .join(";")
        };
        format!(
            "{}|{}|{}|{}|{}",
            source,
            query.text.trim().to_lowercase(),
            query.max_results,
            query.time_range.map(|t| t.code()).unwrap_or("-"),
            variants
        )
    }

    fn is_expired(&self, created_at: i64, now: i64) -> bool {
        now.saturating_sub(created_at) > self.ttl.as_secs() as i64
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<ResultRecord>>, SourceError> {
        let conn = self.open()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT payload, created_at FROM responses WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((payload, created_at)) = row else {
            return Ok(None);
        };
        if self.is_expired(created_at, chrono::Utc::now().timestamp()) {
            conn.execute("DELETE FROM responses WHERE key = ?1", params![key])?;
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&payload)?))
    }

    pub fn put(&self, key: &str, source: &str, records: &[ResultRecord]) -> Result<(), SourceError> {
        let payload = serde_json::to_string(records)?;
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (key, source, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![key, source, payload, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// 删除全部过期条目，返回删除数量
    pub fn purge_expired(&self) -> Result<usize, SourceError> {
        let conn = self.open()?;
        let cutoff = chrono::Utc::now().timestamp() - self.ttl.as_secs() as i64;
        Ok(conn.execute("DELETE FROM responses WHERE created_at < ?1", params![cutoff])?)
    }
}

/// 带缓存的适配器装饰器
pub struct CachedAdapter {
    inner: Arc<dyn SourceAdapter>,
    cache: Arc<ResponseCache>,
}

impl CachedAdapter {
    pub fn new(inner: Arc<dyn SourceAdapter>, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl SourceAdapter for CachedAdapter {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn reliability(&self) -> SourceReliability {
        self.inner.reliability()
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let source = self.inner.id().to_string();
        let key = ResponseCache::key(&source, query);

        let cache = self.cache.clone();
        let lookup_key = key.clone();
        match tokio::task::spawn_blocking(move || cache.get(&lookup_key)).await {
            Ok(Ok(Some(records))) => {
                tracing::debug!(source = %source, "Cache hit");
                return Ok(records);
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => tracing::debug!(source = %source, error = %e, "Cache read failed"),
            Err(e) => tracing::debug!(source = %source, error = %e, "Cache read task failed"),
        }

        let records = self.inner.search(query).await?;
        if !records.is_empty() {
            let cache = self.cache.clone();
            let to_store = records.clone();
            let store_source = source.clone();
            match tokio::task::spawn_blocking(move || cache.put(&key, &store_source, &to_store)).await {
                Ok(Err(e)) => tracing::debug!(source = %source, error = %e, "Cache write failed"),
                Err(e) => tracing::debug!(source = %source, error = %e, "Cache write task failed"),
                Ok(Ok(())) => {}
            }
        }
        Ok(records)
    }
}
