//! 决策类型与模型输出解析
//!
//! 两段式流水线：extract_json_block 从回复中取出首个 JSON 块，normalize_raw 校验动作名并
//! 按动作类型补默认值/截断上限；fallback_decision 是全函数 —— 任何畸形输入最终都能得到
//! 一个合法决策。参见 bee 的 parse_llm_output 同款提取手法。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::research::context::DecisionContext;

/// 单个决策中各列表参数的上限
const MAX_QUERIES: usize = 5;
const MAX_VISIT_TARGETS: usize = 5;
const MAX_SUB_QUESTIONS: usize = 5;
/// 回退访问决策一次最多取的候选数
const FALLBACK_VISIT_TARGETS: usize = 3;

/// 动作种类（五种，封闭集合）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Search,
    Visit,
    Reflect,
    Answer,
    Coding,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Search => "search",
            ActionKind::Visit => "visit",
            ActionKind::Reflect => "reflect",
            ActionKind::Answer => "answer",
            ActionKind::Coding => "coding",
        }
    }

    /// 动作名 -> 种类；未知名返回 None（触发回退）
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "search" => Some(ActionKind::Search),
            "visit" => Some(ActionKind::Visit),
            "reflect" => Some(ActionKind::Reflect),
            "answer" => Some(ActionKind::Answer),
            "coding" => Some(ActionKind::Coding),
            _ => None,
        }
    }
}

/// 归一化后的动作参数
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionParams {
    Search {
        queries: Vec<String>,
    },
    Visit {
        targets: Vec<usize>,
    },
    Reflect {
        questions: Vec<String>,
    },
    Answer {
        text: String,
        references: Vec<String>,
        is_final: bool,
    },
    Coding {
        description: String,
        code: String,
    },
}

impl ActionParams {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionParams::Search { .. } => ActionKind::Search,
            ActionParams::Visit { .. } => ActionKind::Visit,
            ActionParams::Reflect { .. } => ActionKind::Reflect,
            ActionParams::Answer { .. } => ActionKind::Answer,
            ActionParams::Coding { .. } => ActionKind::Coding,
        }
    }
}

/// 强制收束的触发原因（决定报告中的 termination_reason）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedReason {
    FinalizeRequested,
    BudgetExhausted,
    StepLimit,
    Stagnation,
}

/// 决策来源：模型给出 / 解析失败回退 / 安全网强制
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOrigin {
    Model,
    Fallback,
    Forced(ForcedReason),
}

/// 路由产出的决策：动作 + 归一化参数 + 来源
#[derive(Clone, Debug)]
pub struct Decision {
    pub think: String,
    pub params: ActionParams,
    pub origin: DecisionOrigin,
}

impl Decision {
    pub fn kind(&self) -> ActionKind {
        self.params.kind()
    }

    pub fn is_forced(&self) -> bool {
        matches!(self.origin, DecisionOrigin::Forced(_))
    }

    /// 记入行动日志用的规范化参数
    pub fn params_value(&self) -> Value {
        serde_json::to_value(&self.params).unwrap_or(Value::Null)
    }
}

/// 决策回复格式：仅用于 schemars 生成 Schema 拼入 prompt，降低格式错误率
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DecisionFormat {
    /// Free-text rationale for the chosen action
    pub think: String,
    /// One of: search, visit, reflect, answer, coding
    pub action: String,
    /// search only: up to 5 web search queries
    pub search_queries: Option<Vec<String>>,
    /// visit only: up to 5 indices into the URL candidate list
    pub visit_targets: Option<Vec<usize>>,
    /// reflect only: up to 5 sub-questions that still need answers
    pub sub_questions: Option<Vec<String>>,
    /// answer only: the draft answer text
    pub answer: Option<String>,
    /// answer only: source ids cited by the answer
    pub references: Option<Vec<String>>,
    /// answer only: whether this answer is meant to be final
    pub is_final: Option<bool>,
    /// coding only: what the computation should determine
    pub description: Option<String>,
    /// coding only: the code to run in the sandbox
    pub code: Option<String>,
}

/// 返回决策回复的 JSON Schema 字符串，可拼入决策 prompt
pub fn decision_schema_json() -> String {
    let schema = schema_for!(DecisionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 模型原始回复（宽松解析：参数字段保持 Value，畸形字段在归一化时落默认值）
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawDecision {
    pub think: Option<String>,
    pub action: Option<String>,
    pub search_queries: Option<Value>,
    pub visit_targets: Option<Value>,
    pub sub_questions: Option<Value>,
    pub answer: Option<String>,
    pub references: Option<Value>,
    pub is_final: Option<bool>,
    pub description: Option<String>,
    pub code: Option<String>,
}

/// 从回复文本中提取首个 JSON 块（```json 围栏或首尾大括号匹配）
pub fn extract_json_block(text: &str) -> Option<String> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
        return Some(block.to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].to_string())
}

/// 解析模型回复为 RawDecision；无 JSON 块或反序列化失败返回 Err（触发回退）
pub fn parse_reply(reply: &str) -> Result<RawDecision, String> {
    let block = extract_json_block(reply).ok_or_else(|| "no JSON block in reply".to_string())?;
    serde_json::from_str(&block).map_err(|e| format!("{}: {}", e, truncate(&block, 200)))
}

/// 校验并归一化 RawDecision；动作名非法返回 None（触发回退）
pub fn normalize_raw(raw: RawDecision, ctx: &DecisionContext) -> Option<Decision> {
    let kind = ActionKind::from_name(raw.action.as_deref()?)?;
    let think = raw.think.unwrap_or_default();

    let params = match kind {
        ActionKind::Search => {
            let mut queries = string_list(raw.search_queries, MAX_QUERIES);
            if queries.is_empty() {
                queries = vec![ctx.question.clone()];
            }
            ActionParams::Search { queries }
        }
        ActionKind::Visit => {
            let mut targets = index_list(raw.visit_targets, MAX_VISIT_TARGETS);
            if targets.is_empty() {
                targets = vec![0];
            }
            ActionParams::Visit { targets }
        }
        ActionKind::Reflect => {
            let mut questions = string_list(raw.sub_questions, MAX_SUB_QUESTIONS);
            if questions.is_empty() {
                questions = vec![synthesized_sub_question(&ctx.question)];
            }
            ActionParams::Reflect { questions }
        }
        ActionKind::Answer => ActionParams::Answer {
            text: raw.answer.unwrap_or_default(),
            references: string_list(raw.references, usize::MAX),
            is_final: raw.is_final.unwrap_or(false),
        },
        ActionKind::Coding => ActionParams::Coding {
            description: raw.description.unwrap_or_default(),
            code: raw.code.unwrap_or_default(),
        },
    };

    Some(Decision {
        think,
        params,
        origin: DecisionOrigin::Model,
    })
}

/// 全函数回退决策：无知识则搜原问题；有未访问候选则访问之；否则给非强制合成回答
pub fn fallback_decision(ctx: &DecisionContext) -> Decision {
    if ctx.knowledge_total == 0 {
        return Decision {
            think: "No knowledge gathered yet; searching the question itself.".to_string(),
            params: ActionParams::Search {
                queries: vec![ctx.question.clone()],
            },
            origin: DecisionOrigin::Fallback,
        };
    }

    let unvisited = ctx.unvisited_indices();
    if !unvisited.is_empty() {
        return Decision {
            think: "Unvisited search results remain; reading them next.".to_string(),
            params: ActionParams::Visit {
                targets: unvisited.into_iter().take(FALLBACK_VISIT_TARGETS).collect(),
            },
            origin: DecisionOrigin::Fallback,
        };
    }

    let (text, references) = synthesize_answer(ctx, usize::MAX);
    Decision {
        think: "All leads explored; drafting an answer from gathered knowledge.".to_string(),
        params: ActionParams::Answer {
            text,
            references,
            is_final: false,
        },
        origin: DecisionOrigin::Fallback,
    }
}

/// 强制最终回答：拼接知识摘要（字符上限截断），引用全部来源
pub fn forced_answer(ctx: &DecisionContext, reason: ForcedReason, max_chars: usize) -> Decision {
    let (text, references) = synthesize_answer(ctx, max_chars);
    Decision {
        think: format!("Forced finalization ({:?}).", reason),
        params: ActionParams::Answer {
            text,
            references,
            is_final: true,
        },
        origin: DecisionOrigin::Forced(reason),
    }
}

/// 将快照内知识按时间正序拼为回答文本；无知识时给出兜底说明
pub fn synthesize_answer(ctx: &DecisionContext, max_chars: usize) -> (String, Vec<String>) {
    if ctx.knowledge.is_empty() {
        return (
            "No conclusive answer could be assembled from the gathered evidence.".to_string(),
            Vec::new(),
        );
    }

    // ctx.knowledge 为最新在前，合成时恢复时间正序
    let text = ctx
        .knowledge
        .iter()
        .rev()
        .map(|k| k.summary.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    (truncate(&text, max_chars), ctx.sources.clone())
}

/// 从原问题派生的兜底子问题
fn synthesized_sub_question(question: &str) -> String {
    format!("What key facts are still missing to answer: {}?", question)
}

/// Value -> 非空字符串列表（数组或单字符串），上限截断
fn string_list(value: Option<Value>, max: usize) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .take(max)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Value -> 候选 index 列表（数组内数字或数字字符串），上限截断
fn index_list(value: Option<Value>, max: usize) -> Vec<usize> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_u64().map(|n| n as usize),
                Value::String(s) => s.trim().parse::<usize>().ok(),
                _ => None,
            })
            .take(max)
            .collect(),
        Some(Value::Number(n)) => n.as_u64().map(|n| vec![n as usize]).unwrap_or_default(),
        _ => Vec::new(),
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
    use crate::research::context::{classify_question, UrlCandidate};

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
            stagnation: Default::default(),
            finalize_requested: false,
        }
    }

    #[test]
    fn test_extract_fenced_json() {
        let reply = "Let me decide.\n```json\n{\"action\": \"search\"}\n```\ndone";
        assert_eq!(
            extract_json_block(reply).unwrap(),
            "{\"action\": \"search\"}"
        );
    }

    #[test]
    fn test_extract_braced_json() {
        let reply = "prefix {\"action\": \"visit\", \"visit_targets\": [1]} suffix";
        let block = extract_json_block(reply).unwrap();
        assert!(block.starts_with('{') && block.ends_with('}'));
    }

    #[test]
    fn test_no_json_block_fails_parse() {
        assert!(parse_reply("plain prose, nothing structured").is_err());
    }

    #[test]
    fn test_unknown_action_rejected() {
        let raw = RawDecision {
            action: Some("teleport".to_string()),
            ..Default::default()
        };
        assert!(normalize_raw(raw, &ctx("q")).is_none());
    }

    #[test]
    fn test_search_defaults_to_question() {
        // 缺省 search_queries 时必须精确等于 [question]
        let raw = RawDecision {
            action: Some("search".to_string()),
            ..Default::default()
        };
        let d = normalize_raw(raw, &ctx("What is Rust?")).unwrap();
        assert_eq!(
            d.params,
            ActionParams::Search {
                queries: vec!["What is Rust?".to_string()]
            }
        );
    }

    #[test]
    fn test_search_queries_capped_at_five() {
        let raw = RawDecision {
            action: Some("search".to_string()),
            search_queries: Some(serde_json::json!(["a", "b", "c", "d", "e", "f", "g"])),
            ..Default::default()
        };
        let d = normalize_raw(raw, &ctx("q")).unwrap();
        match d.params {
            ActionParams::Search { queries } => assert_eq!(queries.len(), 5),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_visit_defaults_to_first_candidate() {
        let raw = RawDecision {
            action: Some("visit".to_string()),
            visit_targets: Some(serde_json::json!("not a list")),
            ..Default::default()
        };
        let d = normalize_raw(raw, &ctx("q")).unwrap();
        assert_eq!(d.params, ActionParams::Visit { targets: vec![0] });
    }

    #[test]
    fn test_reflect_synthesizes_sub_question() {
        let raw = RawDecision {
            action: Some("reflect".to_string()),
            ..Default::default()
        };
        let d = normalize_raw(raw, &ctx("Why is the sky blue?")).unwrap();
        match d.params {
            ActionParams::Reflect { questions } => {
                assert_eq!(questions.len(), 1);
                assert!(questions[0].contains("Why is the sky blue?"));
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_answer_defaults() {
        let raw = RawDecision {
            action: Some("answer".to_string()),
            ..Default::default()
        };
        let d = normalize_raw(raw, &ctx("q")).unwrap();
        assert_eq!(
            d.params,
            ActionParams::Answer {
                text: String::new(),
                references: Vec::new(),
                is_final: false,
            }
        );
    }

    #[test]
    fn test_fallback_search_when_no_knowledge() {
        let d = fallback_decision(&ctx("X"));
        assert_eq!(d.origin, DecisionOrigin::Fallback);
        assert_eq!(
            d.params,
            ActionParams::Search {
                queries: vec!["X".to_string()]
            }
        );
    }

    #[test]
    fn test_fallback_visits_unvisited_candidates() {
        let mut c = ctx("q");
        c.knowledge_total = 2;
        c.candidates = vec![
            UrlCandidate {
                index: 0,
                url: "https://a".into(),
                title: "a".into(),
                visited: true,
            },
            UrlCandidate {
                index: 1,
                url: "https://b".into(),
                title: "b".into(),
                visited: false,
            },
        ];
        let d = fallback_decision(&c);
        assert_eq!(d.params, ActionParams::Visit { targets: vec![1] });
    }

    #[test]
    fn test_fallback_answer_when_exhausted_leads() {
        let mut c = ctx("q");
        c.knowledge_total = 1;
        let d = fallback_decision(&c);
        match d.params {
            ActionParams::Answer { is_final, .. } => assert!(!is_final),
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_forced_answer_truncated_and_final() {
        let mut c = ctx("q");
        c.knowledge = vec![crate::memory::KnowledgeItem {
            id: uuid::Uuid::new_v4(),
            source_id: "https://a".into(),
            summary: "x".repeat(100),
            created_at_step: 1,
            recorded_at: chrono::Utc::now(),
        }];
        c.knowledge_total = 1;
        c.sources = vec!["https://a".into()];

        let d = forced_answer(&c, ForcedReason::BudgetExhausted, 10);
        match d.params {
            ActionParams::Answer {
                text,
                references,
                is_final,
            } => {
                assert!(is_final);
                assert!(text.chars().count() <= 13); // 10 + "..."
                assert_eq!(references, vec!["https://a".to_string()]);
            }
            other => panic!("unexpected params: {:?}", other),
        }
        assert_eq!(
            d.origin,
            DecisionOrigin::Forced(ForcedReason::BudgetExhausted)
        );
    }

    #[test]
    fn test_decision_schema_mentions_actions() {
        let schema = decision_schema_json();
        assert!(schema.contains("search_queries"));
        assert!(schema.contains("visit_targets"));
    }
}
