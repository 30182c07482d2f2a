//! 知识库：运行期只增的知识条目仓
//!
//! 条目由 Handler 产出、主循环写入；同一 (source_id, summary) 重复写入幂等，不会膨胀。

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

/// Handler 产出的知识草稿（入库时由 KnowledgeStore 补齐 id 与步号）
#[derive(Clone, Debug)]
pub struct KnowledgeDraft {
    /// 来源标识：URL 或 "computation"
    pub source_id: String,
    pub summary: String,
}

impl KnowledgeDraft {
    pub fn new(source_id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            summary: summary.into(),
        }
    }
}

/// 单条知识：入库后不可变
#[derive(Clone, Debug)]
pub struct KnowledgeItem {
    pub id: Uuid,
    pub source_id: String,
    pub summary: String,
    /// 产生该条知识的步号（1 起）
    pub created_at_step: u32,
    pub recorded_at: DateTime<Utc>,
}

/// 只增知识仓：按插入序保存，(source_id, summary) 去重
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    items: Vec<KnowledgeItem>,
    seen: HashSet<(String, String)>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一条草稿；重复 (source_id, summary) 时返回 false 且仓内容不变
    pub fn ingest(&mut self, draft: KnowledgeDraft, step: u32) -> bool {
        let key = (draft.source_id.clone(), draft.summary.clone());
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key);
        self.items.push(KnowledgeItem {
            id: Uuid::new_v4(),
            source_id: draft.source_id,
            summary: draft.summary,
            created_at_step: step,
            recorded_at: Utc::now(),
        });
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[KnowledgeItem] {
        &self.items
    }

    /// 最近的 max 条（最新在前），用于决策上下文快照
    pub fn recent(&self, max: usize) -> Vec<KnowledgeItem> {
        self.items.iter().rev().take(max).cloned().collect()
    }

    /// 按首次出现顺序列出全部来源（去重），用于引用列表
    pub fn sources(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for item in &self.items {
            if seen.insert(item.source_id.clone()) {
                out.push(item.source_id.clone());
            }
        }
        out
    }
}
