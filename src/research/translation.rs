//! 多语言查询扩展
//!
//! 让推理步骤给出各目标语言的检索查询（{"en": "...", "es": "..."}），
//! 缺失或失败的语言一律回退为原主题。结果只作参考，适配器可以忽略。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::llm::{LlmClient, Message};
use crate::research::extraction::extract_json_object;
use crate::research::{reason, TASK_QUERY_EXPANSION};

fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "es" => "Spanish",
        "zh" => "Mandarin Chinese",
        "de" => "German",
        "fr" => "French",
        "ja" => "Japanese",
        other => other,
    }
}

pub struct QueryExpander {
    llm: Arc<dyn LlmClient>,
    languages: Vec<String>,
    timeout: Duration,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn LlmClient>, languages: Vec<String>, timeout: Duration) -> Self {
        let languages = languages
            .into_iter()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        Self {
            llm,
            languages,
            timeout,
        }
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    fn prompt(&self, topic: &str) -> String {
        let names: Vec<&str> = self.languages.iter().map(|l| language_name(l)).collect();
        format!(
            "{task}\n\
             You are a multilingual research expert. Translate and optimize the research topic below \
             so it retrieves the best results in each target language.\n\n\
             ORIGINAL TOPIC: {topic}\n\
             TARGET LANGUAGES: {names}\n\n\
             For each language give the best technical or academic search query.\n\
             Reply ONLY with a flat JSON object whose keys are the language codes ({codes}) \
             and whose values are the translated queries.\n\n\
             EXAMPLE:\n{{\"en\": \"Quantum computing consensus algorithms\", \
             \"es\": \"Algoritmos de consenso en computación cuántica\"}}",
            task = TASK_QUERY_EXPANSION,
            topic = topic,
            names = names.join(", "),
            codes = self.languages.join(", "),
        )
    }

    /// 扩展查询；永不失败
    pub async fn expand(&self, topic: &str) -> BTreeMap<String, String> {
        if self.languages.is_empty() {
            return BTreeMap::new();
        }
        let messages = vec![Message::user(self.prompt(topic))];
        match reason(&self.llm, messages, self.timeout).await {
            Ok(raw) => parse_expansion(&raw, topic, &self.languages),
            Err(e) => {
                tracing::warn!(error = %e, "Query expansion failed, using original topic");
                fallback(topic, &self.languages)
            }
        }
    }
}

fn fallback(topic: &str, languages: &[String]) -> BTreeMap<String, String> {
    languages
        .iter()
        .map(|l| (l.clone(), topic.to_string()))
        .collect()
}

/// 解析扩展结果；非字符串或空值的语言回退为原主题，多余的键忽略
pub fn parse_expansion(raw: &str, topic: &str, languages: &[String]) -> BTreeMap<String, String> {
    let mut out = fallback(topic, languages);
    let Some(json) = extract_json_object(raw) else {
        tracing::warn!("Query expansion returned no JSON object");
        return out;
    };
    match serde_json::from_str::<serde_json::Value>(json) {
        Ok(serde_json::Value::Object(map)) => {
            for lang in languages {
                if let Some(q) = map.get(lang).and_then(|v| v.as_str()) {
                    if !q.trim().is_empty() {
                        out.insert(lang.clone(), q.trim().to_string());
                    }
                }
            }
        }
        Ok(_) => tracing::warn!("Query expansion JSON is not an object"),
        Err(e) => tracing::warn!(error = %e, "Query expansion JSON unparseable"),
    }
    out
}
