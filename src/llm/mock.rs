//! Mock LLM 客户端（用于测试与无 Key 离线运行）
//!
//! MockLlmClient 固定返回一个 search 决策；ScriptedLlmClient 按脚本逐条回放；
//! FailingLlmClient 恒定失败，用于验证回退决策链路。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// Mock 客户端：恒定返回「搜索原问题」的决策 JSON
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, crate::llm::Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let query: String = last_user.chars().take(80).collect();

        Ok(format!(
            r#"{{"think": "mock decision", "action": "search", "search_queries": [{}]}}"#,
            serde_json::to_string(&query).unwrap_or_else(|_| "\"\"".to_string())
        ))
    }
}

/// 脚本化客户端：按注入顺序回放回复，耗尽后回放最后一条
pub struct ScriptedLlmClient {
    replies: Mutex<Vec<String>>,
    last: Mutex<String>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            last: Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Ok(self.last.lock().unwrap().clone());
        }
        let reply = replies.remove(0);
        *self.last.lock().unwrap() = reply.clone();
        Ok(reply)
    }
}

/// 恒定失败的客户端：模拟模型不可达/超时
#[derive(Debug, Default)]
pub struct FailingLlmClient;

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Err("model unreachable".to_string())
    }
}
