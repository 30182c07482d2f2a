//! Answer 动作：评估门控
//!
//! 强制收束的回答（预算/步数/停滞/调用方要求）直接定稿，不经评估器；
//! 模型给出的回答必须过五项标准评估，不通过则把理由交回下一步决策上下文。

use async_trait::async_trait;

use crate::research::decision::{ActionKind, ActionParams, Decision};
use crate::research::evaluator::AnswerEvaluator;
use crate::tools::handler::{ActionHandler, ExecutionContext, HandlerOutcome};

pub struct AnswerHandler {
    evaluator: AnswerEvaluator,
}

impl AnswerHandler {
    pub fn new(evaluator: AnswerEvaluator) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl ActionHandler for AnswerHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Answer
    }

    async fn execute(&self, decision: &Decision, ctx: &ExecutionContext) -> HandlerOutcome {
        let ActionParams::Answer {
            text, references, ..
        } = &decision.params
        else {
            return HandlerOutcome::failed("answer handler got non-answer params");
        };

        let mut outcome = HandlerOutcome::ok();

        // 强制收束：不征求评估器意见
        if decision.is_forced() {
            outcome.finalized = true;
            return outcome;
        }

        let evaluation = self
            .evaluator
            .evaluate(&ctx.question, text, references, &ctx.knowledge)
            .await;
        outcome.finalized = evaluation.pass;
        outcome.evaluation = Some(evaluation);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlmClient, ScriptedLlmClient};
    use crate::research::decision::{DecisionOrigin, ForcedReason};
    use std::sync::Arc;

    fn answer_decision(text: &str, origin: DecisionOrigin) -> Decision {
        Decision {
            think: String::new(),
            params: ActionParams::Answer {
                text: text.to_string(),
                references: vec!["https://a".to_string()],
                is_final: true,
            },
            origin,
        }
    }

    #[tokio::test]
    async fn test_forced_answer_bypasses_evaluator() {
        // 评估器不可用也不妨碍强制收束
        let handler = AnswerHandler::new(AnswerEvaluator::new(Arc::new(FailingLlmClient)));
        let decision = answer_decision(
            "whatever",
            DecisionOrigin::Forced(ForcedReason::BudgetExhausted),
        );

        let outcome = handler
            .execute(&decision, &ExecutionContext::default())
            .await;
        assert!(outcome.finalized);
        assert!(outcome.evaluation.is_none());
    }

    #[tokio::test]
    async fn test_passing_evaluation_finalizes() {
        let llm = ScriptedLlmClient::new(vec![
            r#"{"pass": true, "think": "solid"}"#.to_string(),
        ]);
        let handler = AnswerHandler::new(AnswerEvaluator::new(Arc::new(llm)));
        let decision = answer_decision("The answer is 42.", DecisionOrigin::Model);

        let outcome = handler
            .execute(&decision, &ExecutionContext::default())
            .await;
        assert!(outcome.finalized);
        assert!(outcome.evaluation.unwrap().pass);
    }

    #[tokio::test]
    async fn test_failing_evaluation_returns_rationale() {
        let llm = ScriptedLlmClient::new(vec![
            r#"{"pass": false, "think": "plurality: single source"}"#.to_string(),
        ]);
        let handler = AnswerHandler::new(AnswerEvaluator::new(Arc::new(llm)));
        let decision = answer_decision("The answer is 42.", DecisionOrigin::Model);

        let outcome = handler
            .execute(&decision, &ExecutionContext::default())
            .await;
        assert!(!outcome.finalized);
        assert!(outcome.evaluation.unwrap().think.contains("plurality"));
    }
}
