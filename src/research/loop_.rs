//! 研究主循环
//!
//! 每步：装快照 -> 路由决策 -> 分发 Handler -> 合并结果 -> 步进 -> 收束检查。
//! 运行状态只在步与步之间由本循环修改，没有第二个写者；取消每轮检查一次，
//! 不抢占在途的 Handler。Handler 失败按零知识推进，重试（若有）属于协作方内部。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::AgentSection;
use crate::core::{AgentError, RunPhase, RunReport, TerminationReason};
use crate::llm::LlmClient;
use crate::memory::{ActionHistory, ActionRecord, KnowledgeStore, TokenBudgetTracker};
use crate::research::context::{
    classify_question, DecisionContext, QuestionKind, SubQuestion, UrlCandidate,
};
use crate::research::decision::{
    synthesize_answer, ActionKind, ActionParams, Decision, DecisionOrigin, ForcedReason,
};
use crate::research::evaluator::Evaluation;
use crate::research::events::ResearchEvent;
use crate::research::router::ActionRouter;
use crate::tools::{ExecutionContext, HandlerExecutor};

/// 决策理由在事件中的预览长度
const THINK_PREVIEW_CHARS: usize = 200;

/// 研究会话：主循环依赖的静态部件集合
pub struct ResearchSession<'a> {
    pub router: &'a ActionRouter,
    pub executor: &'a HandlerExecutor,
    /// 与路由/评估共用的 LLM 客户端，循环据此按步采样用量增量
    pub llm: Arc<dyn LlmClient>,
    pub cfg: &'a AgentSection,
    pub cancel_token: CancellationToken,
    pub event_tx: Option<&'a mpsc::UnboundedSender<ResearchEvent>>,
}

impl<'a> ResearchSession<'a> {
    pub fn new(
        router: &'a ActionRouter,
        executor: &'a HandlerExecutor,
        llm: Arc<dyn LlmClient>,
        cfg: &'a AgentSection,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            router,
            executor,
            llm,
            cfg,
            cancel_token,
            event_tx: None,
        }
    }

    /// 设置过程事件通道
    pub fn with_event_tx(mut self, tx: &'a mpsc::UnboundedSender<ResearchEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }
}

/// 运行状态：主循环独占持有与修改
struct RunState {
    /// 已完成步数（首个决策时为 0；记录携带步进后的值，故记录步号 1 起稠密）
    steps_taken: u32,
    knowledge: KnowledgeStore,
    history: ActionHistory,
    budget: TokenBudgetTracker,
    candidates: Vec<UrlCandidate>,
    sub_questions: Vec<SubQuestion>,
    last_evaluation: Option<Evaluation>,
    /// 上次采样时的累计 (prompt, completion)
    usage_mark: (u64, u64),
}

impl RunState {
    fn new(cfg: &AgentSection) -> Self {
        Self {
            steps_taken: 0,
            knowledge: KnowledgeStore::new(),
            history: ActionHistory::new(cfg.loop_window, cfg.progress_window),
            budget: TokenBudgetTracker::new(cfg.token_budget),
            candidates: Vec::new(),
            sub_questions: Vec::new(),
            last_evaluation: None,
            usage_mark: (0, 0),
        }
    }

    /// 每步重建的只读快照；候选视图未访问优先
    fn snapshot(
        &self,
        question: &str,
        question_kind: QuestionKind,
        cfg: &AgentSection,
    ) -> DecisionContext {
        let mut candidates: Vec<UrlCandidate> = self
            .candidates
            .iter()
            .filter(|c| !c.visited)
            .cloned()
            .collect();
        let unvisited = candidates.len();
        if unvisited < cfg.candidate_view {
            candidates.extend(
                self.candidates
                    .iter()
                    .filter(|c| c.visited)
                    .take(cfg.candidate_view - unvisited)
                    .cloned(),
            );
        }
        candidates.truncate(cfg.candidate_view);

        DecisionContext {
            question: question.to_string(),
            question_kind,
            knowledge: self.knowledge.recent(cfg.knowledge_view),
            knowledge_total: self.knowledge.len(),
            sources: self.knowledge.sources(),
            candidates,
            diary: self.history.diary(cfg.diary_view),
            last_evaluation: self.last_evaluation.clone(),
            sub_questions: self.sub_questions.clone(),
            steps_taken: self.steps_taken,
            max_steps: cfg.max_steps,
            budget_remaining: self.budget.remaining(),
            usage_ratio: self.budget.usage_ratio(),
            budget_exceeded: self.budget.is_exceeded(),
            stagnation: self.history.detect_pattern(),
            finalize_requested: cfg.forced_finalization,
        }
    }

    /// 新命中并入候选：按 URL 去重，index 取发现序
    fn merge_candidates(&mut self, discovered: Vec<crate::tools::SearchHit>) {
        for hit in discovered {
            if self.candidates.iter().any(|c| c.url == hit.url) {
                continue;
            }
            let index = self.candidates.len();
            self.candidates.push(UrlCandidate {
                index,
                url: hit.url,
                title: hit.title,
                visited: false,
            });
        }
    }

    fn mark_visited(&mut self, urls: &[String]) {
        for url in urls {
            if let Some(c) = self.candidates.iter_mut().find(|c| &c.url == url) {
                c.visited = true;
            }
        }
    }

    fn merge_sub_questions(&mut self, new: Vec<String>) {
        for q in new {
            if !self.sub_questions.iter().any(|s| s.text == q) {
                self.sub_questions.push(SubQuestion {
                    text: q,
                    answered: false,
                });
            }
        }
    }

    /// 子问题完成标记：其多数实词已出现在累计知识里即视为已覆盖
    fn mark_answered_sub_questions(&mut self) {
        if self.sub_questions.iter().all(|s| s.answered) {
            return;
        }
        let corpus: String = self
            .knowledge
            .items()
            .iter()
            .map(|k| k.summary.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        for sq in self.sub_questions.iter_mut().filter(|s| !s.answered) {
            let words: Vec<String> = sq
                .text
                .to_lowercase()
                .split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > 3)
                .map(String::from)
                .collect();
            if words.is_empty() {
                continue;
            }
            let covered = words.iter().filter(|w| corpus.contains(w.as_str())).count();
            if covered * 2 >= words.len() {
                sq.answered = true;
            }
        }
    }
}

fn send_event(tx: &Option<&mpsc::UnboundedSender<ResearchEvent>>, ev: ResearchEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 从 answer 决策中取出回答文本与引用
fn answer_payload(decision: &Decision) -> (String, Vec<String>) {
    match &decision.params {
        ActionParams::Answer {
            text, references, ..
        } => (text.clone(), references.clone()),
        _ => (String::new(), Vec::new()),
    }
}

fn reason_of(origin: DecisionOrigin) -> TerminationReason {
    match origin {
        DecisionOrigin::Forced(ForcedReason::FinalizeRequested) => {
            TerminationReason::FinalizeRequested
        }
        DecisionOrigin::Forced(ForcedReason::BudgetExhausted) => TerminationReason::Budget,
        DecisionOrigin::Forced(ForcedReason::StepLimit) => TerminationReason::StepLimit,
        DecisionOrigin::Forced(ForcedReason::Stagnation) => TerminationReason::Stagnation,
        _ => TerminationReason::Evaluated,
    }
}

/// 执行一次研究运行：入参校验 -> 循环至收束
///
/// 终止保证：每轮要么收束返回，要么 steps_taken 加一；steps_taken 到达 max_steps
/// 必定返回，与模型/协作方表现无关。
pub async fn research_loop(
    session: &ResearchSession<'_>,
    question: &str,
) -> Result<RunReport, AgentError> {
    if question.trim().is_empty() {
        return Err(AgentError::InvalidQuestion("question is empty".to_string()));
    }
    if session.cfg.max_steps == 0 {
        return Err(AgentError::InvalidConfig(
            "max_steps must be positive".to_string(),
        ));
    }

    let cfg = session.cfg;
    let question_kind = classify_question(question);
    let mut state = RunState::new(cfg);
    let (p0, c0, _) = session.llm.token_usage();
    state.usage_mark = (p0, c0);

    tracing::info!(question = %question, kind = ?question_kind, max_steps = cfg.max_steps, "research run started");

    loop {
        // 取消只在步边界检查，不打断在途动作
        if session.cancel_token.is_cancelled() {
            send_event(
                &session.event_tx,
                ResearchEvent::RunTerminated {
                    phase: RunPhase::Cancelled,
                    reason: TerminationReason::Cancelled,
                    steps: state.steps_taken,
                    knowledge_items: state.knowledge.len(),
                },
            );
            return Err(AgentError::Cancelled);
        }

        let display_step = state.steps_taken + 1;
        send_event(
            &session.event_tx,
            ResearchEvent::StepStarted {
                step: display_step,
                max_steps: cfg.max_steps,
            },
        );

        // 1. 快照 2. 决策
        let ctx = state.snapshot(question, question_kind, cfg);
        let decision = session.router.decide(&ctx).await;
        send_event(
            &session.event_tx,
            ResearchEvent::ActionDecided {
                step: display_step,
                action: decision.kind().as_str().to_string(),
                origin: decision.origin,
                think: truncate(&decision.think, THINK_PREVIEW_CHARS),
            },
        );

        // 3. 分发；Handler 失败不终止运行，按零知识推进
        let exec_ctx = ExecutionContext {
            question: question.to_string(),
            candidates: state.candidates.clone(),
            knowledge: state.knowledge.recent(cfg.knowledge_view),
            step: display_step,
        };
        let outcome = session.executor.execute(&decision, &exec_ctx).await;
        if let Some(err) = &outcome.error {
            tracing::warn!(step = display_step, error = %err, "action reported a problem");
        }

        // 4. 合并结果
        let mut added = 0;
        for draft in outcome.knowledge {
            if state.knowledge.ingest(draft, display_step) {
                added += 1;
            }
        }
        state.merge_candidates(outcome.discovered);
        state.mark_visited(&outcome.visited);
        state.merge_sub_questions(outcome.sub_questions);
        state.mark_answered_sub_questions();
        if outcome.evaluation.is_some() {
            state.last_evaluation = outcome.evaluation;
        }

        send_event(
            &session.event_tx,
            ResearchEvent::ActionCompleted {
                step: display_step,
                action: decision.kind().as_str().to_string(),
                ok: outcome.success,
                knowledge_added: added,
            },
        );

        // 步进并记录（记录步号 = 步进后的 steps_taken，1 起稠密）
        state.steps_taken += 1;
        state.history.record(
            ActionRecord {
                step: state.steps_taken,
                kind: decision.kind().as_str().to_string(),
                think: decision.think.clone(),
                params: decision.params_value(),
            },
            state.knowledge.len(),
        );

        // 本步 token 用量增量入预算
        let (cur_p, cur_c, cur_t) = session.llm.token_usage();
        let dp = cur_p.saturating_sub(state.usage_mark.0);
        let dc = cur_c.saturating_sub(state.usage_mark.1);
        state.usage_mark = (cur_p, cur_c);
        state.budget.track_usage(dp as i64, dc as i64);
        send_event(
            &session.event_tx,
            ResearchEvent::TokenUsage {
                prompt_tokens: dp,
                completion_tokens: dc,
                cumulative_total: cur_t,
                budget_remaining: state.budget.remaining(),
            },
        );

        // 5. 最终回答 -> Answered
        if decision.kind() == ActionKind::Answer && outcome.finalized {
            let (answer, references) = answer_payload(&decision);
            let reason = reason_of(decision.origin);
            send_event(
                &session.event_tx,
                ResearchEvent::RunTerminated {
                    phase: RunPhase::Answered,
                    reason,
                    steps: state.steps_taken,
                    knowledge_items: state.knowledge.len(),
                },
            );
            return Ok(RunReport {
                answer,
                references,
                knowledge_item_count: state.knowledge.len(),
                step_count: state.steps_taken,
                phase: RunPhase::Answered,
                termination_reason: reason,
            });
        }

        // 6. 步数用尽 -> Exhausted（仍带尽力合成的回答）
        if state.steps_taken >= cfg.max_steps {
            let ctx = state.snapshot(question, question_kind, cfg);
            let (answer, references) =
                synthesize_answer(&ctx, cfg.forced_answer_max_chars);
            send_event(
                &session.event_tx,
                ResearchEvent::RunTerminated {
                    phase: RunPhase::Exhausted,
                    reason: TerminationReason::StepLimit,
                    steps: state.steps_taken,
                    knowledge_items: state.knowledge.len(),
                },
            );
            return Ok(RunReport {
                answer,
                references,
                knowledge_item_count: state.knowledge.len(),
                step_count: state.steps_taken,
                phase: RunPhase::Exhausted,
                termination_reason: TerminationReason::StepLimit,
            });
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
