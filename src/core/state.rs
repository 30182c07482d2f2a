//! 运行状态定义：阶段、收束原因与运行报告
//!
//! 阶段机：Idle -> Running -> {Answered | Exhausted | Cancelled}，终态不可逆；
//! 运行内部的完整状态（知识、日志、预算）由主循环独占持有，外部只拿到 RunReport。

use serde::Serialize;

/// 运行阶段（终态吸收）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Running,
    /// 产出了标记为最终的回答（评估通过或强制收束）
    Answered,
    /// 步数用尽且未产生最终回答；报告中仍带尽力合成的回答
    Exhausted,
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Answered | RunPhase::Exhausted | RunPhase::Cancelled)
    }
}

/// 收束原因：为什么这次运行停在了这里
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// 回答通过了质量评估
    Evaluated,
    /// token 预算耗尽，强制合成回答
    Budget,
    /// 步数达到上限
    StepLimit,
    /// 停滞检测触发（打转或无新知识）
    Stagnation,
    /// 调用方要求直接收束
    FinalizeRequested,
    /// 调用方取消（只出现在过程事件里；取消的运行不产出报告）
    Cancelled,
}

/// 单次运行的对外报告
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub answer: String,
    /// 引用的知识来源（URL 或 "computation"）
    pub references: Vec<String>,
    pub knowledge_item_count: usize,
    pub step_count: u32,
    pub phase: RunPhase,
    pub termination_reason: TerminationReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_phases() {
        assert!(!RunPhase::Idle.is_terminal());
        assert!(!RunPhase::Running.is_terminal());
        assert!(RunPhase::Answered.is_terminal());
        assert!(RunPhase::Exhausted.is_terminal());
        assert!(RunPhase::Cancelled.is_terminal());
    }
}
