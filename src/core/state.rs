//! 研究状态：ResearchState 及其组成部分
//!
//! ResearchState 由 Orchestrator 独占；适配器与综合器只读取或返回片段，合并全部由 Orchestrator 完成。
//! results_by_source 使用 BTreeMap，下游按固定的来源顺序遍历，与完成顺序无关。

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::ResearchError;
use crate::core::request::RequestError;
use crate::core::step::Step;
use crate::observability::MetricsSnapshot;
use crate::research::quality;

/// 信息源标识（小写、去空白），排序与底层字符串一致
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub const WIKI: &'static str = "wiki";
    pub const WEB: &'static str = "web";
    pub const ARXIV: &'static str = "arxiv";
    pub const SCHOLAR: &'static str = "scholar";
    pub const GITHUB: &'static str = "github";
    pub const HN: &'static str = "hn";
    pub const SO: &'static str = "so";
    pub const REDDIT: &'static str = "reddit";
    pub const YOUTUBE: &'static str = "youtube";
    pub const LOCAL_RAG: &'static str = "local_rag";

    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for SourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// 来源类型（用于可靠性说明与参考文献格式）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Encyclopedic,
    Web,
    Preprint,
    Academic,
    Code,
    QuestionAnswer,
    Discussion,
    Community,
    Video,
    UserProvided,
}

impl SourceType {
    pub fn label(self) -> &'static str {
        match self {
            SourceType::Encyclopedic => "encyclopedic",
            SourceType::Web => "web",
            SourceType::Preprint => "preprint",
            SourceType::Academic => "academic",
            SourceType::Code => "code",
            SourceType::QuestionAnswer => "q&a",
            SourceType::Discussion => "discussion",
            SourceType::Community => "community",
            SourceType::Video => "video",
            SourceType::UserProvided => "user_provided_knowledge",
        }
    }
}

/// 来源可靠性元数据，每个来源在第一次成功抓取时写入一次
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReliability {
    /// 1..=5
    pub reliability_score: u8,
    pub source_type: SourceType,
}

impl SourceReliability {
    pub fn new(score: u8, source_type: SourceType) -> Self {
        Self {
            reliability_score: score.clamp(1, 5),
            source_type,
        }
    }

    /// 综合上下文中每个来源前的元数据行
    pub fn describe(&self) -> String {
        format!(
            "type: {} | reliability: {}/5",
            self.source_type.label(),
            self.reliability_score
        )
    }
}

/// 单条检索结果
///
/// url 要么是可解析的 http(s)/file 链接，要么为 None（显式无链接）；综合文本只能引用这里出现过的 URL。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub title: String,
    pub content: String,
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl ResultRecord {
    /// 无链接记录；需要链接时接 with_url
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            url: None,
            fields: BTreeMap::new(),
        }
    }

    /// 设置链接；不可解析或协议不支持时保持无链接
    pub fn with_url(mut self, url: impl AsRef<str>) -> Self {
        let raw = url.as_ref().trim();
        match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https" | "file") => {
                self.url = Some(raw.to_string());
            }
            _ => {
                if !raw.is_empty() {
                    tracing::debug!(url = %raw, "Dropping unresolvable record url");
                }
                self.url = None;
            }
        }
        self
    }

    /// 来源特有字段（stars、year、authors…），空值忽略
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.fields.insert(key.into(), value);
        }
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn is_link_less(&self) -> bool {
        self.url.is_none()
    }

    /// 按字符数截断内容（不切断 UTF-8 字符）
    pub fn cap_content(mut self, max_chars: usize) -> Self {
        if self.content.chars().count() > max_chars {
            self.content = self.content.chars().take(max_chars).collect();
        }
        self
    }
}

/// 检索深度：决定每个来源的结果上限
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthMode {
    Quick,
    #[default]
    Standard,
    Deep,
}

impl DepthMode {
    /// 纯函数：只取决于深度，与来源无关
    pub fn max_results(self) -> usize {
        match self {
            DepthMode::Quick => 2,
            DepthMode::Standard => 5,
            DepthMode::Deep => 10,
        }
    }
}

impl FromStr for DepthMode {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" => Ok(DepthMode::Quick),
            "standard" => Ok(DepthMode::Standard),
            "deep" => Ok(DepthMode::Deep),
            other => Err(RequestError::UnknownDepth(other.to_string())),
        }
    }
}

/// 角色：影响规划偏好与综合语气，与检索本身正交
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    General,
    Business,
    Tech,
    Academic,
    #[serde(rename = "pm")]
    ProductManager,
    NewsEditor,
}

impl Persona {
    pub const ALL: [Persona; 6] = [
        Persona::General,
        Persona::Business,
        Persona::Tech,
        Persona::Academic,
        Persona::ProductManager,
        Persona::NewsEditor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Persona::General => "general",
            Persona::Business => "business",
            Persona::Tech => "tech",
            Persona::Academic => "academic",
            Persona::ProductManager => "pm",
            Persona::NewsEditor => "news_editor",
        }
    }

    /// 快速摘要角色：评估阶段首轮即判定充分
    pub fn is_fast_digest(self) -> bool {
        self == Persona::NewsEditor
    }

    pub fn default_time_range(self) -> Option<TimeRange> {
        match self {
            Persona::NewsEditor => Some(TimeRange::Day),
            _ => None,
        }
    }
}

impl FromStr for Persona {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Persona::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or(RequestError::UnknownPersona(s))
    }
}

/// 时间范围过滤（支持的来源才会使用）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    /// 单字母代码（d/w/m/y）
    pub fn code(self) -> &'static str {
        match self {
            TimeRange::Day => "d",
            TimeRange::Week => "w",
            TimeRange::Month => "m",
            TimeRange::Year => "y",
        }
    }

    pub fn word(self) -> &'static str {
        match self {
            TimeRange::Day => "day",
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
        }
    }

    pub fn as_seconds(self) -> i64 {
        match self {
            TimeRange::Day => 86_400,
            TimeRange::Week => 7 * 86_400,
            TimeRange::Month => 30 * 86_400,
            TimeRange::Year => 365 * 86_400,
        }
    }
}

/// 检索计划：有序、无重复；空计划合法，表示直接进入综合
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan(Vec<SourceId>);

impl Plan {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// 去重并保留首次出现的顺序，空白 id 丢弃
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SourceId>,
    {
        let mut out: Vec<SourceId> = Vec::new();
        for id in ids {
            let id = id.into();
            if !id.as_str().is_empty() && !out.contains(&id) {
                out.push(id);
            }
        }
        Self(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&SourceId> {
        self.0.first()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|s| s.as_str() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[SourceId] {
        &self.0
    }

    /// 首步指针：第一个来源，空计划为 End
    pub fn cursor(&self) -> Cursor {
        match self.first() {
            Some(id) => Cursor::Source(id.clone()),
            None => Cursor::End,
        }
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a SourceId;
    type IntoIter = std::slice::Iter<'a, SourceId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// 指向下一个待处理来源，或结束
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cursor {
    Source(SourceId),
    #[default]
    End,
}

/// 单次研究请求的完整可变状态
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchState {
    pub run_id: Uuid,
    /// 用户原始主题，设置后不再改变
    topic: String,
    /// 当前检索主题（主题或评估给出的补充查询）
    pub working_topic: String,
    pub plan: Plan,
    /// 调用方预置的计划，第一轮原样执行
    pub pinned_plan: Option<Plan>,
    pub cursor: Cursor,
    pub step: Step,
    pub iteration_count: u32,
    pub results_by_source: BTreeMap<SourceId, Vec<ResultRecord>>,
    pub source_reliability: BTreeMap<SourceId, SourceReliability>,
    pub synthesis: String,
    pub bibliography: Vec<String>,
    pub depth_mode: DepthMode,
    pub persona: Persona,
    pub time_range: Option<TimeRange>,
    /// 语言 → 查询变体（en / es …）
    pub queries: BTreeMap<String, String>,
    pub sufficient: bool,
    pub evaluation_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ResearchState {
    pub fn new(topic: impl Into<String>) -> Self {
        let topic = topic.into();
        Self {
            run_id: Uuid::new_v4(),
            working_topic: topic.clone(),
            topic,
            plan: Plan::empty(),
            pinned_plan: None,
            cursor: Cursor::End,
            step: Step::Init,
            iteration_count: 0,
            results_by_source: BTreeMap::new(),
            source_reliability: BTreeMap::new(),
            synthesis: String::new(),
            bibliography: Vec::new(),
            depth_mode: DepthMode::default(),
            persona: Persona::default(),
            time_range: None,
            queries: BTreeMap::new(),
            sufficient: false,
            evaluation_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn with_depth(mut self, depth: DepthMode) -> Self {
        self.depth_mode = depth;
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_pinned_plan(mut self, plan: Plan) -> Self {
        self.pinned_plan = Some(plan);
        self
    }

    pub fn with_time_range(mut self, range: Option<TimeRange>) -> Self {
        self.time_range = range;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// INIT：补齐所有字段默认值，下游阶段只需假设字段存在
    pub fn normalize(&mut self) {
        self.topic = self.topic.trim().to_string();
        self.working_topic = self.working_topic.trim().to_string();
        if self.working_topic.is_empty() {
            self.working_topic = self.topic.clone();
        }
        if self.time_range.is_none() {
            self.time_range = self.persona.default_time_range();
        }
        if self.plan.is_empty() {
            self.cursor = Cursor::End;
        }
        self.sufficient = false;
        self.finished_at = None;
    }

    /// 按转移表进入下一阶段
    pub fn enter(&mut self, next: Step) -> Result<(), ResearchError> {
        if !self.step.can_transition_to(next) {
            return Err(ResearchError::InvalidTransition {
                from: self.step,
                to: next,
            });
        }
        self.step = next;
        if next == Step::Done {
            self.finished_at = Some(Utc::now());
            self.cursor = Cursor::End;
        }
        Ok(())
    }

    /// 写入本轮计划与查询变体
    pub fn apply_plan(&mut self, plan: Plan, queries: BTreeMap<String, String>) {
        self.cursor = plan.cursor();
        self.plan = plan;
        self.queries = queries;
    }

    /// 追加某来源本轮结果；已有的键只追加不替换，空结果也会建立键
    pub fn merge_results(&mut self, source: SourceId, records: Vec<ResultRecord>) {
        self.results_by_source
            .entry(source)
            .or_default()
            .extend(records);
    }

    /// 可靠性元数据只在第一次写入时生效
    pub fn record_reliability(&mut self, source: SourceId, reliability: SourceReliability) {
        self.source_reliability.entry(source).or_insert(reliability);
    }

    pub fn total_records(&self) -> usize {
        self.results_by_source.values().map(Vec::len).sum()
    }

    pub fn max_results(&self) -> usize {
        self.depth_mode.max_results()
    }

    /// 所有记录的 URL 集合（引用校验用）
    pub fn known_urls(&self) -> std::collections::BTreeSet<&str> {
        self.results_by_source
            .values()
            .flatten()
            .filter_map(|r| r.url.as_deref())
            .collect()
    }

    /// 给渲染 / 投递方的窄视图
    pub fn report(&self, metrics: Option<MetricsSnapshot>) -> ResearchReport {
        ResearchReport {
            run_id: self.run_id,
            topic: self.topic.clone(),
            persona: self.persona,
            depth_mode: self.depth_mode,
            synthesis: self.synthesis.clone(),
            synthesis_quality: quality::score_content(&self.synthesis),
            bibliography: self.bibliography.clone(),
            results_by_source: self.results_by_source.clone(),
            source_reliability: self.source_reliability.clone(),
            iterations: self.iteration_count,
            sufficient: self.sufficient,
            evaluation_reason: self.evaluation_reason.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            metrics,
        }
    }
}

/// 研究结果的窄视图（交给报告渲染、邮件、持久化等外部协作方）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResearchReport {
    pub run_id: Uuid,
    pub topic: String,
    pub persona: Persona,
    pub depth_mode: DepthMode,
    pub synthesis: String,
    pub synthesis_quality: f32,
    pub bibliography: Vec<String>,
    pub results_by_source: BTreeMap<SourceId, Vec<ResultRecord>>,
    pub source_reliability: BTreeMap<SourceId, SourceReliability>,
    pub iterations: u32,
    pub sufficient: bool,
    pub evaluation_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSnapshot>,
}
