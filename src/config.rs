//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，如 `FORAGER__RESEARCH__MAX_ITERATIONS=2`）。
//! API Key 未写入配置时回退到常规环境变量（TAVILY_API_KEY、GITHUB_TOKEN、YOUTUBE_API_KEY）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub research: ResearchSection,
    pub sources: SourcesSection,
}

/// [app] 段：应用名、默认日志级别
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_level: "info".to_string(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / ollama / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次 HTTP 请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [research] 段：循环上限、上下文预算、并发与超时、回退计划
#[derive(Debug, Clone, Deserialize)]
pub struct ResearchSection {
    /// 评估循环上限（首轮之外最多再补充几轮）
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// 综合上下文字符预算
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
    /// 单个来源的硬超时（秒）
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    /// 规划 / 综合 / 评估推理步骤的硬超时（秒）
    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_fallback_plan")]
    pub fallback_plan: Vec<String>,
    /// 补充查询构造策略：all / first / top:N
    #[serde(default = "default_refinement")]
    pub refinement: String,
    #[serde(default = "default_expansion_languages")]
    pub expansion_languages: Vec<String>,
    #[serde(default = "default_depth")]
    pub default_depth: String,
    #[serde(default = "default_persona")]
    pub default_persona: String,
    /// 综合后剔除不在检索结果中的 URL
    #[serde(default = "default_verify_citations")]
    pub verify_citations: bool,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_context_chars: default_max_context_chars(),
            max_concurrent_sources: default_max_concurrent_sources(),
            source_timeout_secs: default_source_timeout_secs(),
            llm_timeout_secs: default_llm_timeout_secs(),
            fallback_plan: default_fallback_plan(),
            refinement: default_refinement(),
            expansion_languages: default_expansion_languages(),
            default_depth: default_depth(),
            default_persona: default_persona(),
            verify_citations: default_verify_citations(),
        }
    }
}

fn default_max_iterations() -> u32 {
    1
}

fn default_max_context_chars() -> usize {
    50_000
}

fn default_max_concurrent_sources() -> usize {
    5
}

fn default_source_timeout_secs() -> u64 {
    30
}

fn default_llm_timeout_secs() -> u64 {
    120
}

fn default_fallback_plan() -> Vec<String> {
    vec!["wiki".into(), "web".into()]
}

fn default_refinement() -> String {
    "all".to_string()
}

fn default_expansion_languages() -> Vec<String> {
    vec!["en".into(), "es".into()]
}

fn default_depth() -> String {
    "standard".to_string()
}

fn default_persona() -> String {
    "general".to_string()
}

fn default_verify_citations() -> bool {
    true
}

/// [sources] 段：API Key、本地知识库目录、缓存与单条内容上限
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesSection {
    pub tavily_api_key: Option<String>,
    pub github_token: Option<String>,
    pub youtube_api_key: Option<String>,
    #[serde(default = "default_knowledge_base_dir")]
    pub knowledge_base_dir: PathBuf,
    /// 响应缓存 SQLite 文件；未设置则不缓存
    pub cache_path: Option<PathBuf>,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
    /// 单条记录内容字符上限
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// 来源白名单；未设置时启用全部
    pub enabled: Option<Vec<String>>,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            github_token: None,
            youtube_api_key: None,
            knowledge_base_dir: default_knowledge_base_dir(),
            cache_path: None,
            cache_ttl_hours: default_cache_ttl_hours(),
            max_content_chars: default_max_content_chars(),
            enabled: None,
        }
    }
}

fn default_knowledge_base_dir() -> PathBuf {
    PathBuf::from("./knowledge_base")
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_max_content_chars() -> usize {
    3000
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl SourcesSection {
    pub fn tavily_key(&self) -> Option<String> {
        self.tavily_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_non_empty("TAVILY_API_KEY"))
    }

    pub fn github_token(&self) -> Option<String> {
        self.github_token
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_non_empty("GITHUB_TOKEN"))
    }

    pub fn youtube_key(&self) -> Option<String> {
        self.youtube_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| env_non_empty("YOUTUBE_API_KEY"))
    }

    /// 来源是否启用（白名单为空视为全部启用）
    pub fn is_enabled(&self, id: &str) -> bool {
        match &self.enabled {
            Some(list) if !list.is_empty() => list.iter().any(|s| s.trim().eq_ignore_ascii_case(id)),
            _ => true,
        }
    }
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGER")
            .prefix_separator("__")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("research.fallback_plan")
            .with_list_parse_key("research.expansion_languages")
            .with_list_parse_key("sources.enabled")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
