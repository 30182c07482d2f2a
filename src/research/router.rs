//! 动作路由：决定下一步做什么
//!
//! 状态机：先按固定顺序过安全网（调用方收束 / 预算耗尽 / 步数到顶 / 停滞），任一命中
//! 直接产出强制最终回答；否则拼上下文咨询模型，解析失败走全函数回退。路由自身从不出错 ——
//! 无论模型表现如何，decide 总会给出一个合法决策。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::config::AgentSection;
use crate::llm::{LlmClient, Message};
use crate::research::context::DecisionContext;
use crate::research::decision::{
    decision_schema_json, fallback_decision, forced_answer, normalize_raw, parse_reply, Decision,
    ForcedReason,
};

/// 动作路由器：持有 LLM 与 [agent] 配置（截断上限、强制回答字数等）
pub struct ActionRouter {
    llm: Arc<dyn LlmClient>,
    cfg: AgentSection,
    request_timeout: Duration,
}

impl ActionRouter {
    pub fn new(llm: Arc<dyn LlmClient>, cfg: AgentSection, request_timeout_secs: u64) -> Self {
        Self {
            llm,
            cfg,
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }

    /// 产出下一步决策；全函数，绝不返回错误
    pub async fn decide(&self, ctx: &DecisionContext) -> Decision {
        // 安全网按固定顺序检查，任一命中即强制收束
        if let Some(reason) = self.forced_reason(ctx) {
            tracing::info!(?reason, step = ctx.steps_taken, "override fired, forcing final answer");
            return forced_answer(ctx, reason, self.cfg.forced_answer_max_chars);
        }

        let messages = self.build_messages(ctx);
        let reply = match timeout(self.request_timeout, self.llm.complete(&messages)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "decision call failed, using fallback");
                return fallback_decision(ctx);
            }
            Err(_) => {
                tracing::warn!("decision call timed out, using fallback");
                return fallback_decision(ctx);
            }
        };

        match parse_reply(&reply) {
            Ok(raw) => normalize_raw(raw, ctx).unwrap_or_else(|| {
                tracing::warn!("model chose an unknown action, using fallback");
                fallback_decision(ctx)
            }),
            Err(e) => {
                tracing::warn!(error = %e, "decision reply unparseable, using fallback");
                fallback_decision(ctx)
            }
        }
    }

    /// 安全网检查，顺序固定：收束请求 > 预算 > 步数 > 停滞
    fn forced_reason(&self, ctx: &DecisionContext) -> Option<ForcedReason> {
        if ctx.finalize_requested {
            return Some(ForcedReason::FinalizeRequested);
        }
        if ctx.budget_exceeded {
            return Some(ForcedReason::BudgetExhausted);
        }
        if ctx.steps_taken >= ctx.max_steps {
            return Some(ForcedReason::StepLimit);
        }
        if ctx.stagnation.any() {
            return Some(ForcedReason::Stagnation);
        }
        None
    }

    fn build_messages(&self, ctx: &DecisionContext) -> Vec<Message> {
        let system = format!(
            r#"You are an autonomous research agent. Each turn you pick exactly one next action:
- search: run web searches for new leads (search_queries)
- visit: read pages already discovered, by candidate index (visit_targets)
- reflect: record sub-questions that still need answers (sub_questions)
- answer: draft a final answer citing gathered knowledge (answer, references, is_final)
- coding: run a computation in a sandbox (description, code)

Prefer visiting promising unvisited results over repeating searches. Only answer
once the gathered knowledge actually covers the question. Reply with exactly one
JSON object matching this schema, and nothing else:

{}"#,
            decision_schema_json()
        );

        let mut user = String::new();
        user.push_str(&format!(
            "Question ({}): {}\n",
            ctx.question_kind.as_str(),
            ctx.question
        ));
        user.push_str(&format!(
            "Step {} of {} | token budget remaining: {} (used {:.0}%)\n",
            ctx.steps_taken + 1,
            ctx.max_steps,
            ctx.budget_remaining,
            ctx.usage_ratio * 100.0
        ));

        if ctx.knowledge.is_empty() {
            user.push_str("\nNo knowledge gathered yet.\n");
        } else {
            user.push_str(&format!(
                "\nGathered knowledge ({} total, most recent first):\n",
                ctx.knowledge_total
            ));
            for item in &ctx.knowledge {
                user.push_str(&format!(
                    "- [step {}] {}: {}\n",
                    item.created_at_step,
                    item.source_id,
                    truncate(&item.summary, self.cfg.summary_chars)
                ));
            }
        }

        let unvisited: Vec<_> = ctx.candidates.iter().filter(|c| !c.visited).collect();
        let visited: Vec<_> = ctx.candidates.iter().filter(|c| c.visited).collect();
        if !unvisited.is_empty() {
            user.push_str("\nUnvisited URL candidates:\n");
            for c in unvisited {
                user.push_str(&format!("- [{}] {} — {}\n", c.index, c.title, c.url));
            }
        }
        if !visited.is_empty() {
            user.push_str("\nAlready visited:\n");
            for c in visited {
                user.push_str(&format!("- [{}] {}\n", c.index, c.url));
            }
        }

        if !ctx.diary.is_empty() {
            user.push_str("\nRecent actions:\n");
            for line in &ctx.diary {
                user.push_str(&format!("- {}\n", line));
            }
        }

        if let Some(eval) = &ctx.last_evaluation {
            if !eval.pass {
                user.push_str(&format!(
                    "\nYour previous answer draft was REJECTED: {}\n",
                    eval.think
                ));
            }
        }

        if !ctx.sub_questions.is_empty() {
            user.push_str("\nSub-questions:\n");
            for sq in &ctx.sub_questions {
                let mark = if sq.answered { "answered" } else { "open" };
                user.push_str(&format!("- [{}] {}\n", mark, sq.text));
            }
        }

        user.push_str("\nDecide the next action.");

        vec![Message::system(system), Message::user(user)]
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FailingLlmClient, ScriptedLlmClient};
    use crate::memory::StagnationReport;
    use crate::research::context::{classify_question, DecisionContext};
    use crate::research::decision::{ActionKind, ActionParams, DecisionOrigin};

    fn ctx(question: &str) -> DecisionContext {
        DecisionContext {
            question: question.to_string(),
            question_kind: classify_question(question),
            knowledge: Vec::new(),
            knowledge_total: 0,
            sources: Vec::new(),
            candidates: Vec::new(),
            diary: Vec::new(),
            last_evaluation: None,
            sub_questions: Vec::new(),
            steps_taken: 0,
            max_steps: 10,
            budget_remaining: 1000,
            usage_ratio: 0.0,
            budget_exceeded: false,
            stagnation: StagnationReport::default(),
            finalize_requested: false,
        }
    }

    fn router(llm: Arc<dyn LlmClient>) -> ActionRouter {
        ActionRouter::new(llm, crate::config::AgentSection::default(), 5)
    }

    #[tokio::test]
    async fn test_budget_override_beats_model() {
        // 模型会给 search，但预算耗尽必须强制最终回答
        let llm = ScriptedLlmClient::new(vec![
            r#"{"action": "search", "search_queries": ["x"]}"#.to_string(),
        ]);
        let r = router(Arc::new(llm));
        let mut c = ctx("q");
        c.budget_exceeded = true;

        let d = r.decide(&c).await;
        assert_eq!(d.kind(), ActionKind::Answer);
        assert_eq!(
            d.origin,
            DecisionOrigin::Forced(ForcedReason::BudgetExhausted)
        );
        match d.params {
            ActionParams::Answer { is_final, .. } => assert!(is_final),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stagnation_override_beats_model() {
        let llm = ScriptedLlmClient::new(vec![
            r#"{"action": "visit", "visit_targets": [0]}"#.to_string(),
        ]);
        let r = router(Arc::new(llm));
        let mut c = ctx("q");
        c.stagnation = StagnationReport {
            stuck_in_loop: true,
            no_progress: false,
        };

        let d = r.decide(&c).await;
        assert_eq!(d.origin, DecisionOrigin::Forced(ForcedReason::Stagnation));
    }

    #[tokio::test]
    async fn test_finalize_flag_is_highest_priority() {
        let r = router(Arc::new(FailingLlmClient));
        let mut c = ctx("q");
        c.finalize_requested = true;
        c.budget_exceeded = true;

        let d = r.decide(&c).await;
        assert_eq!(
            d.origin,
            DecisionOrigin::Forced(ForcedReason::FinalizeRequested)
        );
    }

    #[tokio::test]
    async fn test_model_decision_normalized() {
        let llm = ScriptedLlmClient::new(vec![
            r#"```json
{"think": "look it up", "action": "search", "search_queries": ["rust borrow checker"]}
```"#
                .to_string(),
        ]);
        let r = router(Arc::new(llm));
        let d = r.decide(&ctx("q")).await;
        assert_eq!(d.origin, DecisionOrigin::Model);
        assert_eq!(
            d.params,
            ActionParams::Search {
                queries: vec!["rust borrow checker".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_search() {
        let r = router(Arc::new(FailingLlmClient));
        let d = r.decide(&ctx("X")).await;
        assert_eq!(d.origin, DecisionOrigin::Fallback);
        assert_eq!(
            d.params,
            ActionParams::Search {
                queries: vec!["X".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_garbage_reply_falls_back() {
        let llm = ScriptedLlmClient::new(vec!["I would rather write a poem.".to_string()]);
        let r = router(Arc::new(llm));
        let d = r.decide(&ctx("q")).await;
        assert_eq!(d.origin, DecisionOrigin::Fallback);
    }
}
