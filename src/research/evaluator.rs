//! 回答质量评估：五项标准门控
//!
//! freshness / plurality / completeness / attribution / definitive 全部满足才放行。
//! 先跑本地确定性预检（空回答、无引用、hedging 用词），剩余判断委托 LLM；
//! 协作方失败一律判不通过并带诊断 —— 失败的评估绝不会把回答放行为最终。

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm::{LlmClient, Message};
use crate::memory::KnowledgeItem;
use crate::research::decision::extract_json_block;

/// 评估结论：pass=false 时主循环必须继续而非收束
#[derive(Clone, Debug, Serialize)]
pub struct Evaluation {
    pub pass: bool,
    /// 评估理由；不通过时点名未满足的标准
    pub think: String,
}

/// 评估请求的 LLM 回复（宽松解析）
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVerdict {
    pass: Option<bool>,
    think: Option<String>,
}

/// 回答评估器：持有与路由共用的 LLM 客户端
pub struct AnswerEvaluator {
    llm: Arc<dyn LlmClient>,
    hedge_markers: Regex,
}

impl AnswerEvaluator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            hedge_markers: Regex::new(
                r"(?i)\b(maybe|perhaps|possibly|probably|unclear|not sure|uncertain|might be|could be|i think|it seems)\b",
            )
            .unwrap(),
        }
    }

    /// 评估一份候选回答；全标准通过才返回 pass=true
    pub async fn evaluate(
        &self,
        question: &str,
        answer: &str,
        references: &[String],
        knowledge: &[KnowledgeItem],
    ) -> Evaluation {
        // 本地预检：确定性失败无需动用模型
        if answer.trim().is_empty() {
            return Evaluation {
                pass: false,
                think: "completeness: the draft answer is empty".to_string(),
            };
        }
        if references.is_empty() {
            return Evaluation {
                pass: false,
                think: "attribution: the answer cites no knowledge sources".to_string(),
            };
        }
        if let Some(m) = self.hedge_markers.find(answer) {
            return Evaluation {
                pass: false,
                think: format!(
                    "definitive: hedging language detected ({})",
                    m.as_str()
                ),
            };
        }

        self.consult_model(question, answer, references, knowledge).await
    }

    async fn consult_model(
        &self,
        question: &str,
        answer: &str,
        references: &[String],
        knowledge: &[KnowledgeItem],
    ) -> Evaluation {
        let digest: String = knowledge
            .iter()
            .map(|k| {
                format!(
                    "- [step {}] {}: {}",
                    k.created_at_step,
                    k.source_id,
                    truncate(&k.summary, 200)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"You are a strict answer reviewer. Judge the draft answer against ALL of these criteria:
- freshness: the cited knowledge is recent enough for the question
- plurality: the answer draws on several distinct sources
- completeness: every sub-part of the question is covered
- attribution: every claim is traceable to a gathered knowledge item
- definitive: the answer commits to a conclusion without hedging

Question: {question}

Draft answer:
{answer}

Cited references: {references:?}

Gathered knowledge:
{digest}

Reply with one JSON object: {{"pass": true|false, "think": "name every unmet criterion, or why it passes"}}"#
        );

        let messages = vec![Message::user(prompt)];
        let reply = match self.llm.complete(&messages).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "answer evaluation call failed");
                return Evaluation {
                    pass: false,
                    think: format!("evaluator unavailable: {}", e),
                };
            }
        };

        let verdict: RawVerdict = extract_json_block(&reply)
            .and_then(|block| serde_json::from_str(&block).ok())
            .unwrap_or_default();

        Evaluation {
            pass: verdict.pass.unwrap_or(false),
            think: verdict
                .think
                .unwrap_or_else(|| "evaluator returned no rationale".to_string()),
        }
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

    #[tokio::test]
    async fn test_empty_answer_fails_locally() {
        let eval = AnswerEvaluator::new(Arc::new(FailingLlmClient));
        let v = eval.evaluate("q", "  ", &["https://a".into()], &[]).await;
        assert!(!v.pass);
        assert!(v.think.contains("completeness"));
    }

    #[tokio::test]
    async fn test_missing_references_fail_locally() {
        let eval = AnswerEvaluator::new(Arc::new(FailingLlmClient));
        let v = eval.evaluate("q", "An answer.", &[], &[]).await;
        assert!(!v.pass);
        assert!(v.think.contains("attribution"));
    }

    #[tokio::test]
    async fn test_hedging_fails_locally() {
        let eval = AnswerEvaluator::new(Arc::new(FailingLlmClient));
        let v = eval
            .evaluate("q", "It is probably forty-two.", &["https://a".into()], &[])
            .await;
        assert!(!v.pass);
        assert!(v.think.contains("definitive"));
    }

    #[tokio::test]
    async fn test_model_verdict_pass() {
        let llm = ScriptedLlmClient::new(vec![
            r#"{"pass": true, "think": "all criteria satisfied"}"#.to_string(),
        ]);
        let eval = AnswerEvaluator::new(Arc::new(llm));
        let v = eval
            .evaluate("q", "The answer is 42.", &["https://a".into()], &[])
            .await;
        assert!(v.pass);
    }

    #[tokio::test]
    async fn test_evaluator_failure_never_passes() {
        let eval = AnswerEvaluator::new(Arc::new(FailingLlmClient));
        let v = eval
            .evaluate("q", "The answer is 42.", &["https://a".into()], &[])
            .await;
        assert!(!v.pass);
        assert!(v.think.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_garbled_verdict_fails_closed() {
        let llm = ScriptedLlmClient::new(vec!["not json at all".to_string()]);
        let eval = AnswerEvaluator::new(Arc::new(llm));
        let v = eval
            .evaluate("q", "The answer is 42.", &["https://a".into()], &[])
            .await;
        assert!(!v.pass);
    }
}
