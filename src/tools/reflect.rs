//! Reflect 动作：登记待解的子问题
//!
//! 无外部调用；只做自身去重后把子问题作为元数据交回主循环合并。

use async_trait::async_trait;

use crate::research::decision::{ActionKind, ActionParams, Decision};
use crate::tools::handler::{ActionHandler, ExecutionContext, HandlerOutcome};

#[derive(Default)]
pub struct ReflectHandler;

impl ReflectHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ActionHandler for ReflectHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Reflect
    }

    async fn execute(&self, decision: &Decision, _ctx: &ExecutionContext) -> HandlerOutcome {
        let ActionParams::Reflect { questions } = &decision.params else {
            return HandlerOutcome::failed("reflect handler got non-reflect params");
        };

        let mut outcome = HandlerOutcome::ok();
        for q in questions {
            let q = q.trim();
            if !q.is_empty() && !outcome.sub_questions.iter().any(|s| s == q) {
                outcome.sub_questions.push(q.to_string());
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::decision::DecisionOrigin;

    #[tokio::test]
    async fn test_sub_questions_deduped() {
        let handler = ReflectHandler::new();
        let decision = Decision {
            think: String::new(),
            params: ActionParams::Reflect {
                questions: vec![
                    "What is X?".to_string(),
                    "What is X?".to_string(),
                    "  ".to_string(),
                    "What is Y?".to_string(),
                ],
            },
            origin: DecisionOrigin::Model,
        };

        let outcome = handler
            .execute(&decision, &ExecutionContext::default())
            .await;
        assert!(outcome.success);
        assert_eq!(
            outcome.sub_questions,
            vec!["What is X?".to_string(), "What is Y?".to_string()]
        );
    }
}
