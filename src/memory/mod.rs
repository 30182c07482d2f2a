//! 运行期记忆：token 预算、行动日志、知识仓（均为只增，主循环独占写入）

pub mod budget;
pub mod diary;
pub mod knowledge;

pub use budget::TokenBudgetTracker;
pub use diary::{ActionHistory, ActionRecord, StagnationReport};
pub use knowledge::{KnowledgeDraft, KnowledgeItem, KnowledgeStore};
