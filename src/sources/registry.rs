//! 信息源注册表
//!
//! 按 id 存储 Arc<dyn SourceAdapter>；BTreeMap 保证 ids() / available() 顺序稳定。
//! 新来源通过实现 SourceAdapter 并注册加入，调度器无需改动。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::state::SourceId;
use crate::sources::adapter::SourceAdapter;

#[derive(Default, Clone)]
pub struct SourceRegistry {
    adapters: BTreeMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: impl SourceAdapter + 'static) {
        self.register_arc(Arc::new(adapter));
    }

    /// 同 id 重复注册时后者覆盖前者
    pub fn register_arc(&mut self, adapter: Arc<dyn SourceAdapter>) {
        let id = SourceId::new(adapter.id());
        if self.adapters.insert(id.clone(), adapter).is_some() {
            tracing::debug!(source = %id, "Replacing registered source adapter");
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adapters.contains_key(id)
    }

    pub fn ids(&self) -> Vec<SourceId> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// 当前可用来源的 (id, description)，用于生成规划提示中的来源列表
    pub fn available(&self) -> Vec<(SourceId, String)> {
        self.adapters
            .iter()
            .filter(|(_, a)| a.is_available())
            .map(|(id, a)| (id.clone(), a.description().to_string()))
            .collect()
    }

    pub fn is_available(&self, id: &str) -> bool {
        self.adapters.get(id).map(|a| a.is_available()).unwrap_or(false)
    }

    /// 用装饰器包装全部适配器（例如响应缓存）
    pub fn wrap_all<F>(self, mut wrap: F) -> Self
    where
        F: FnMut(Arc<dyn SourceAdapter>) -> Arc<dyn SourceAdapter>,
    {
        Self {
            adapters: self
                .adapters
                .into_iter()
                .map(|(id, a)| (id, wrap(a)))
                .collect(),
        }
    }
}
