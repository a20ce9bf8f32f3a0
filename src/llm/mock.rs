//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! - MockLlmClient：回显最后一条 User 消息
//! - ScriptedLlmClient：按 prompt 中的标记返回预设回复，可模拟失败与延迟，并统计调用次数

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::message::last_user_content;
use crate::llm::{LlmClient, LlmError, Message};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        Ok(last_user_content(messages).unwrap_or("(no input)").to_string())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// 预设回复
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// 固定文本
    Text(String),
    /// 回显最后一条 User 消息
    Echo,
    /// 返回错误
    Fail(LlmError),
    /// 先等待再给出内层回复（用于超时测试）
    Delayed(Duration, Box<ScriptedReply>),
}

impl ScriptedReply {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn delayed(delay: Duration, inner: ScriptedReply) -> Self {
        Self::Delayed(delay, Box::new(inner))
    }
}

struct Rule {
    marker: String,
    reply: ScriptedReply,
    hits: AtomicUsize,
}

/// 脚本化客户端：第一个出现在消息中的 marker 决定回复，否则使用默认回复
pub struct ScriptedLlmClient {
    rules: Vec<Rule>,
    default_reply: ScriptedReply,
    calls: AtomicUsize,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            default_reply: ScriptedReply::Fail(LlmError::Request("no scripted reply".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    /// 消息中包含 marker 时返回 reply
    pub fn on(mut self, marker: impl Into<String>, reply: ScriptedReply) -> Self {
        self.rules.push(Rule {
            marker: marker.into(),
            reply,
            hits: AtomicUsize::new(0),
        });
        self
    }

    pub fn otherwise(mut self, reply: ScriptedReply) -> Self {
        self.default_reply = reply;
        self
    }

    /// 总调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 某个 marker 命中次数
    pub fn hits(&self, marker: &str) -> usize {
        self.rules
            .iter()
            .filter(|r| r.marker == marker)
            .map(|r| r.hits.load(Ordering::SeqCst))
            .sum()
    }

    fn select(&self, messages: &[Message]) -> ScriptedReply {
        for rule in &self.rules {
            if messages.iter().any(|m| m.content.contains(&rule.marker)) {
                rule.hits.fetch_add(1, Ordering::SeqCst);
                return rule.reply.clone();
            }
        }
        self.default_reply.clone()
    }
}

async fn resolve(reply: ScriptedReply, messages: &[Message]) -> Result<String, LlmError> {
    let mut reply = reply;
    loop {
        match reply {
            ScriptedReply::Text(s) => return Ok(s),
            ScriptedReply::Echo => {
                return Ok(last_user_content(messages).unwrap_or_default().to_string())
            }
            ScriptedReply::Fail(e) => return Err(e),
            ScriptedReply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.select(messages);
        resolve(reply, messages).await
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
