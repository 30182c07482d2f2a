//! 决策上下文：每步重建的只读快照
//!
//! 快照由主循环从运行状态装配（知识、候选、日志、预算、子问题），路由与回退决策只读取
//! 快照、从不反向修改状态，保证「唯一写者」不变式显而易见。

use serde::Serialize;

use crate::memory::{KnowledgeItem, StagnationReport};
use crate::research::evaluator::Evaluation;

/// 问题类型（仅作路由提示，由关键词启发式判定，不调用模型）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// 单点事实（who / when / where ...）
    Factual,
    /// 多对象比较
    Comparative,
    /// 需要计算或统计
    Computational,
    /// 开放式
    OpenEnded,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::Factual => "factual",
            QuestionKind::Comparative => "comparative",
            QuestionKind::Computational => "computational",
            QuestionKind::OpenEnded => "open-ended",
        }
    }
}

/// 关键词启发式分类；拿不准时落到 OpenEnded
pub fn classify_question(question: &str) -> QuestionKind {
    let q = question.to_lowercase();

    let comparative = [" vs ", "versus", "compare", "difference between", "better than"];
    if comparative.iter().any(|k| q.contains(k)) {
        return QuestionKind::Comparative;
    }

    let computational = [
        "how many",
        "how much",
        "calculate",
        "compute",
        "average",
        "percentage",
        "sum of",
    ];
    if computational.iter().any(|k| q.contains(k)) {
        return QuestionKind::Computational;
    }

    let factual = ["who ", "when ", "where ", "which ", "what year", "what is the"];
    if factual.iter().any(|k| q.starts_with(k) || q.contains(k)) {
        return QuestionKind::Factual;
    }

    QuestionKind::OpenEnded
}

/// 搜索发现的 URL 候选；index 为运行内稠密编号（发现序）
#[derive(Clone, Debug)]
pub struct UrlCandidate {
    pub index: usize,
    pub url: String,
    pub title: String,
    pub visited: bool,
}

/// reflect 动作登记的子问题及其完成标记
#[derive(Clone, Debug)]
pub struct SubQuestion {
    pub text: String,
    pub answered: bool,
}

/// 单步决策的只读快照
#[derive(Clone, Debug)]
pub struct DecisionContext {
    pub question: String,
    pub question_kind: QuestionKind,
    /// 最近知识（最新在前，受 knowledge_view 限制）
    pub knowledge: Vec<KnowledgeItem>,
    /// 知识仓总量（可能大于快照内条数）
    pub knowledge_total: usize,
    /// 全部知识来源（去重、首现序），供合成回答引用
    pub sources: Vec<String>,
    /// URL 候选视图（未访问优先，受 candidate_view 限制）
    pub candidates: Vec<UrlCandidate>,
    /// 行动日志尾部（时间正序）
    pub diary: Vec<String>,
    pub last_evaluation: Option<Evaluation>,
    pub sub_questions: Vec<SubQuestion>,
    /// 已完成步数（首个决策时为 0）
    pub steps_taken: u32,
    pub max_steps: u32,
    pub budget_remaining: u64,
    pub usage_ratio: f64,
    /// 预算已耗尽（来自 TokenBudgetTracker 快照）
    pub budget_exceeded: bool,
    /// 停滞检测快照（来自 ActionHistory）
    pub stagnation: StagnationReport,
    /// 调用方要求直接收束
    pub finalize_requested: bool,
}

impl DecisionContext {
    /// 快照内未访问候选的 index 列表（编号序）
    pub fn unvisited_indices(&self) -> Vec<usize> {
        self.candidates
            .iter()
            .filter(|c| !c.visited)
            .map(|c| c.index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_comparative() {
        assert_eq!(
            classify_question("Rust vs Go for network services"),
            QuestionKind::Comparative
        );
    }

    #[test]
    fn test_classify_computational() {
        assert_eq!(
            classify_question("How many moons does Jupiter have?"),
            QuestionKind::Computational
        );
    }

    #[test]
    fn test_classify_factual() {
        assert_eq!(
            classify_question("Who wrote The Left Hand of Darkness?"),
            QuestionKind::Factual
        );
    }

    #[test]
    fn test_classify_open_ended_default() {
        assert_eq!(
            classify_question("Explain the tradeoffs of eventual consistency"),
            QuestionKind::OpenEnded
        );
    }
}
