//! Coding 动作与沙箱执行协作方
//!
//! 隔离与安全完全由沙箱端负责，这里把它当不透明服务：提交 {description, code}，
//! 拿回文本结果转为一条 source_id = "computation" 的知识。端点未配置时每次调用
//! 都按协作方失败处理，运行继续。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SandboxSection;
use crate::memory::KnowledgeDraft;
use crate::research::decision::{ActionKind, ActionParams, Decision};
use crate::tools::handler::{ActionHandler, ExecutionContext, HandlerOutcome};

/// 计算结果的固定来源标识
pub const COMPUTATION_SOURCE: &str = "computation";

/// 沙箱执行抽象
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn run(&self, description: &str, code: &str) -> Result<String, String>;
}

#[derive(Debug, Deserialize)]
struct SandboxResponse {
    #[serde(default)]
    output: String,
}

/// HTTP 沙箱客户端：POST {"description", "code"} 到配置端点
pub struct HttpSandboxExecutor {
    client: Client,
    endpoint: Option<String>,
}

impl HttpSandboxExecutor {
    pub fn new(cfg: &SandboxSection) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: cfg.endpoint.clone(),
        }
    }
}

#[async_trait]
impl CodeExecutor for HttpSandboxExecutor {
    async fn run(&self, description: &str, code: &str) -> Result<String, String> {
        let Some(endpoint) = &self.endpoint else {
            return Err("sandbox endpoint not configured".to_string());
        };

        let body = serde_json::json!({
            "description": description,
            "code": code,
        });
        let resp = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("sandbox request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("sandbox HTTP {}", resp.status()));
        }

        let parsed: SandboxResponse = resp
            .json()
            .await
            .map_err(|e| format!("sandbox response parse: {}", e))?;
        Ok(parsed.output)
    }
}

/// 静态执行器：固定输出（测试 / 离线运行）
pub struct StaticCodeExecutor {
    output: String,
}

impl StaticCodeExecutor {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

#[async_trait]
impl CodeExecutor for StaticCodeExecutor {
    async fn run(&self, _description: &str, _code: &str) -> Result<String, String> {
        Ok(self.output.clone())
    }
}

/// Coding Handler：提交沙箱，结果转知识
pub struct CodingHandler {
    executor: Arc<dyn CodeExecutor>,
}

impl CodingHandler {
    pub fn new(executor: Arc<dyn CodeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ActionHandler for CodingHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Coding
    }

    async fn execute(&self, decision: &Decision, _ctx: &ExecutionContext) -> HandlerOutcome {
        let ActionParams::Coding { description, code } = &decision.params else {
            return HandlerOutcome::failed("coding handler got non-coding params");
        };

        match self.executor.run(description, code).await {
            Ok(output) => {
                let mut outcome = HandlerOutcome::ok();
                outcome.knowledge.push(KnowledgeDraft::new(
                    COMPUTATION_SOURCE,
                    format!("Computation: {}\nResult: {}", description, output),
                ));
                outcome
            }
            Err(e) => {
                tracing::warn!(error = %e, "sandbox execution failed");
                HandlerOutcome::failed(e)
            }
        }
    }
}
