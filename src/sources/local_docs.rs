//! 本地知识库来源（local_rag）
//!
//! 递归扫描知识库目录中的 .txt / .md / .pdf；指纹 = 修改时间 + 大小，只解析新增或变化的文件。
//! 解析结果缓存在 SQLite（files / content 两张表）。每次操作都打开自己的短连接，
//! 以便并发的检索任务同时读写同一个缓存文件。所有磁盘与数据库工作都在阻塞线程池上执行。

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use walkdir::WalkDir;

use crate::core::error::SourceError;
use crate::core::watchdog::blocking_with_deadline;
use crate::core::state::{ResultRecord, SourceId, SourceReliability, SourceType};
use crate::sources::adapter::{SourceAdapter, SourceQuery};
use crate::sources::tokenizer::{count_hits, tokenize};

const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "pdf"];

/// 文件名命中权重高于正文命中
const FILENAME_WEIGHT: usize = 3;

/// 一次增量索引的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub scanned: usize,
    pub parsed: usize,
    pub failed: usize,
}

/// 知识库索引（目录 + SQLite 缓存文件）
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: PathBuf,
    db_path: PathBuf,
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 修改时间（纳秒精度）+ 大小
pub fn fingerprint(path: &Path) -> Option<String> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .unwrap_or(Duration::ZERO);
    Some(format!("{}.{:09}_{}", mtime.as_secs(), mtime.subsec_nanos(), meta.len()))
}

fn extract_text(path: &Path) -> Result<String, SourceError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    if ext == "pdf" {
        pdf_extract::extract_text(path)
            .map_err(|e| SourceError::Malformed(format!("{}: {}", path.display(), e)))
    } else {
        let bytes = std::fs::read(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn file_url(path: &Path) -> Option<String> {
    let abs = std::fs::canonicalize(path).ok()?;
    url::Url::from_file_path(abs).ok().map(|u| u.to_string())
}

impl KnowledgeBase {
    pub fn new(root: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            db_path: db_path.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 递归列出支持的文件（排序，保证结果稳定）
    pub fn scan_files(&self) -> Vec<PathBuf> {
        if !self.root.is_dir() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    pub fn has_files(&self) -> bool {
        if !self.root.is_dir() {
            return false;
        }
        WalkDir::new(&self.root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file() && is_supported(e.path()))
    }

    /// 每次操作一个短连接
    fn open(&self) -> Result<Connection, SourceError> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                last_seen INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS content (
                path TEXT PRIMARY KEY,
                text TEXT NOT NULL
            );",
        )?;
        Ok(conn)
    }

    fn known_fingerprints(&self) -> Result<BTreeMap<String, String>, SourceError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT path, fingerprint FROM files")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// 增量索引：只解析指纹变化的文件
    pub fn refresh(&self) -> Result<RefreshStats, SourceError> {
        let files = self.scan_files();
        let known = self.known_fingerprints()?;
        let mut stats = RefreshStats {
            scanned: files.len(),
            ..Default::default()
        };

        let mut indexed: Vec<(String, String, String)> = Vec::new();
        for path in &files {
            let Some(fp) = fingerprint(path) else {
                continue;
            };
            let key = path.to_string_lossy().into_owned();
            if known.get(&key) == Some(&fp) {
                continue;
            }
            match extract_text(path) {
                Ok(text) => {
                    stats.parsed += 1;
                    indexed.push((key, fp, text));
                }
                Err(e) => {
                    // 记下指纹、正文留空：文件不变就不再重试
                    stats.failed += 1;
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse knowledge base file");
                    indexed.push((key, fp, String::new()));
                }
            }
        }

        if !indexed.is_empty() {
            let mut conn = self.open()?;
            let tx = conn.transaction()?;
            let now = chrono::Utc::now().timestamp();
            for (path, fp, text) in &indexed {
                tx.execute(
                    "INSERT OR REPLACE INTO files (path, fingerprint, last_seen) VALUES (?1, ?2, ?3)",
                    params![path, fp, now],
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO content (path, text) VALUES (?1, ?2)",
                    params![path, text],
                )?;
            }
            tx.commit()?;
            tracing::info!(
                parsed = stats.parsed,
                failed = stats.failed,
                scanned = stats.scanned,
                "Knowledge base index updated"
            );
        }
        Ok(stats)
    }

    /// 关键词打分检索；磁盘上已删除的文件跳过
    pub fn search(
        &self,
        topic: &str,
        max_results: usize,
        max_content_chars: usize,
    ) -> Result<Vec<ResultRecord>, SourceError> {
        let on_disk: BTreeSet<String> = self
            .scan_files()
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let tokens = tokenize(topic);

        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT path, text FROM content")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut scored: Vec<(usize, String, String)> = Vec::new();
        for row in rows {
            let (path, text) = row?;
            if !on_disk.contains(&path) || text.trim().is_empty() {
                continue;
            }
            let filename = Path::new(&path)
                .file_name()
                .map(|f| f.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let filename_hits = count_hits(&tokens, &filename);
            let content_hits = count_hits(&tokens, &text.to_lowercase());
            if tokens.is_empty() || filename_hits > 0 || content_hits > 0 {
                scored.push((filename_hits * FILENAME_WEIGHT + content_hits, path, text));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored.truncate(max_results);

        Ok(scored
            .into_iter()
            .map(|(score, path, text)| {
                let p = Path::new(&path);
                let title = p
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                let mut record = ResultRecord::new(title, text.trim())
                    .with_field("path", path.clone())
                    .with_field("score", score.to_string());
                if let Some(url) = file_url(p) {
                    record = record.with_url(url);
                }
                record.cap_content(max_content_chars)
            })
            .collect())
    }
}

pub struct LocalDocsSource {
    kb: Arc<KnowledgeBase>,
    max_content_chars: usize,
    index_timeout: Duration,
}

impl LocalDocsSource {
    pub fn new(kb: KnowledgeBase, max_content_chars: usize) -> Self {
        Self {
            kb: Arc::new(kb),
            max_content_chars,
            index_timeout: Duration::from_secs(30),
        }
    }

    /// 索引刷新 + 检索的阻塞工作上限；超时后放弃等待
    pub fn with_index_timeout(mut self, limit: Duration) -> Self {
        self.index_timeout = limit;
        self
    }
}

#[async_trait]
impl SourceAdapter for LocalDocsSource {
    fn id(&self) -> &str {
        SourceId::LOCAL_RAG
    }

    fn description(&self) -> &str {
        "Local knowledge base: documents the user provided (notes, papers, internal reports)"
    }

    fn reliability(&self) -> SourceReliability {
        SourceReliability::new(5, SourceType::UserProvided)
    }

    fn is_available(&self) -> bool {
        self.kb.has_files()
    }

    async fn search(&self, query: &SourceQuery) -> Result<Vec<ResultRecord>, SourceError> {
        let kb = self.kb.clone();
        let topic = query.text.clone();
        let max_results = query.max_results;
        let max_chars = self.max_content_chars;
        blocking_with_deadline(self.index_timeout, move || {
            kb.refresh()?;
            kb.search(&topic, max_results, max_chars)
        })
        .await?
    }
}
