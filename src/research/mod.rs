//! 认知层：决策上下文、动作路由、回答评估与研究主循环

pub mod context;
pub mod decision;
pub mod evaluator;
pub mod events;
pub mod loop_;
pub mod router;

pub use context::{classify_question, DecisionContext, QuestionKind, SubQuestion, UrlCandidate};
pub use decision::{
    fallback_decision, forced_answer, ActionKind, ActionParams, Decision, DecisionOrigin,
    ForcedReason,
};
pub use evaluator::{AnswerEvaluator, Evaluation};
pub use events::ResearchEvent;
pub use loop_::{research_loop, ResearchSession};
pub use router::ActionRouter;
