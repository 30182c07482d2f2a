//! 研究过程事件：每步边界推送，供 CLI / 服务端等前端展示

use serde::Serialize;

use crate::core::{RunPhase, TerminationReason};
use crate::research::decision::DecisionOrigin;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// 一步开始（step 为 1 起的展示步号）
    StepStarted { step: u32, max_steps: u32 },
    /// 路由给出决策
    ActionDecided {
        step: u32,
        action: String,
        origin: DecisionOrigin,
        /// 决策理由（预览，避免过长）
        think: String,
    },
    /// 动作执行完毕
    ActionCompleted {
        step: u32,
        action: String,
        ok: bool,
        knowledge_added: usize,
    },
    /// 本步 token 用量（增量 + 累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        cumulative_total: u64,
        budget_remaining: u64,
    },
    /// 运行收束
    RunTerminated {
        phase: RunPhase,
        reason: TerminationReason,
        steps: u32,
        knowledge_items: usize,
    },
}
