//! DeepSeek / Ollama 客户端（OpenAI 兼容格式）
//!
//! - DeepSeek: https://api.deepseek.com，默认模型 deepseek-chat
//! - Ollama: 本地 http://localhost:11434/v1，模型由配置或 OLLAMA_MODEL 指定

use crate::llm::OpenAiClient;

/// DeepSeek API 常量
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// Ollama 默认端点与模型
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const OLLAMA_DEFAULT_MODEL: &str = "qwen3:14b";

/// 创建 DeepSeek 客户端
///
/// - 优先使用环境变量 `DEEPSEEK_API_KEY`
/// - 模型可通过 `model` 参数或 `DEEPSEEK_MODEL` 环境变量指定
pub fn create_deepseek_client(model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| "sk-placeholder".to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_MODEL").ok())
        .unwrap_or_else(|| DEEPSEEK_CHAT.to_string());

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, Some(api_key.as_str()))
}

/// 创建 Ollama 客户端（Ollama 不校验 key）
///
/// base_url 优先级：参数 > `OLLAMA_BASE_URL`（自动补 /v1）> 默认本地端点
pub fn create_ollama_client(base_url: Option<&str>, model: Option<&str>) -> OpenAiClient {
    let base = base_url
        .map(String::from)
        .or_else(|| {
            std::env::var("OLLAMA_BASE_URL")
                .ok()
                .map(|u| ensure_v1_suffix(&u))
        })
        .unwrap_or_else(|| OLLAMA_BASE_URL.to_string());

    let model = model
        .map(String::from)
        .or_else(|| std::env::var("OLLAMA_MODEL").ok())
        .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string());

    OpenAiClient::new(Some(&base), &model, Some("ollama"))
}

fn ensure_v1_suffix(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}
