//! 动作 Handler 契约与执行器
//!
//! 五种动作各自实现 ActionHandler（按动作种类注册/查找），HandlerExecutor 在调用时加超时并
//! 输出结构化审计日志（JSON）。Handler 从不直接改运行状态：结果统一以 HandlerOutcome 返回，
//! 由主循环合并。超时与协作方失败都表达为 success=false 的结果，而非错误。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::time::timeout;

use crate::memory::{KnowledgeDraft, KnowledgeItem};
use crate::research::context::UrlCandidate;
use crate::research::decision::{ActionKind, Decision};
use crate::research::evaluator::Evaluation;
use crate::tools::search::SearchHit;

/// 动作执行上下文：主循环装配的只读快照
#[derive(Clone, Debug, Default)]
pub struct ExecutionContext {
    pub question: String,
    /// 全量 URL 候选（visit 的 index 解析依据）
    pub candidates: Vec<UrlCandidate>,
    /// 最近知识视图（answer 评估依据）
    pub knowledge: Vec<KnowledgeItem>,
    /// 展示步号（1 起）
    pub step: u32,
}

/// Handler 执行结果
#[derive(Debug, Default)]
pub struct HandlerOutcome {
    pub success: bool,
    pub knowledge: Vec<KnowledgeDraft>,
    /// 新发现的 URL 命中（主循环按发现序编号并入候选）
    pub discovered: Vec<SearchHit>,
    /// 本步尝试访问过的 URL（无论抓取成败都记为已访问）
    pub visited: Vec<String>,
    /// reflect 动作登记的子问题
    pub sub_questions: Vec<String>,
    /// answer 动作的评估结论
    pub evaluation: Option<Evaluation>,
    /// answer 动作且（评估通过或强制收束）时为 true
    pub finalized: bool,
    /// 诊断信息（协作方失败、部分失败等）
    pub error: Option<String>,
}

impl HandlerOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// 动作 Handler trait：一种动作一个实现，内部只触碰自己包装的外部协作方
#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn kind(&self) -> ActionKind;

    async fn execute(&self, decision: &Decision, ctx: &ExecutionContext) -> HandlerOutcome;
}

/// Handler 注册表：按动作种类存储 Arc<dyn ActionHandler>
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: impl ActionHandler + 'static) {
        self.handlers.insert(handler.kind(), Arc::new(handler));
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }
}

/// Handler 执行器：对每次调用施加统一超时并输出审计日志
pub struct HandlerExecutor {
    registry: HandlerRegistry,
    timeout: Duration,
}

impl HandlerExecutor {
    pub fn new(registry: HandlerRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行决策对应的 Handler；超时转为失败结果，未注册的动作同理
    pub async fn execute(&self, decision: &Decision, ctx: &ExecutionContext) -> HandlerOutcome {
        let kind = decision.kind();
        let Some(handler) = self.registry.get(kind) else {
            return HandlerOutcome::failed(format!("no handler registered for {}", kind.as_str()));
        };

        let start = Instant::now();
        let result = timeout(self.timeout, handler.execute(decision, ctx)).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(_) => HandlerOutcome::failed(format!("action {} timed out", kind.as_str())),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "action_audit",
            "action": kind.as_str(),
            "step": ctx.step,
            "ok": outcome.success,
            "knowledge": outcome.knowledge.len(),
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "action");

        outcome
    }
}
