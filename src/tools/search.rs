//! Search 动作与搜索提供方
//!
//! 提供方是 SERP 风格的 HTTP JSON 端点（可配置 endpoint 与 provider 标识，Key 走
//! SEARCH_API_KEY）。Handler 按查询顺序逐条发起（不并行，限制外联压力），命中带非空
//! 摘要才产出知识；提供方失败只作为诊断返回，不会中断运行。

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SearchSection;
use crate::memory::KnowledgeDraft;
use crate::research::decision::{ActionKind, ActionParams, Decision};
use crate::tools::handler::{ActionHandler, ExecutionContext, HandlerOutcome};

/// 单条搜索命中
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// 搜索提供方抽象
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String>;
}

/// SERP 风格 JSON 回包（serper 兼容：organic 数组）
#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic: Vec<SerpHit>,
}

#[derive(Debug, Deserialize)]
struct SerpHit {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

/// HTTP 搜索提供方：POST {"q", "num", "provider"}，Key 放 X-API-KEY 头
pub struct HttpSearchProvider {
    client: Client,
    endpoint: String,
    provider: String,
    api_key: Option<String>,
}

impl HttpSearchProvider {
    pub fn new(cfg: &SearchSection, endpoint: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            provider: cfg.provider.clone(),
            api_key: std::env::var("SEARCH_API_KEY").ok(),
        }
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        let body = serde_json::json!({
            "q": query,
            "num": max_results,
            "provider": self.provider,
        });

        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| format!("search request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("search HTTP {}", resp.status()));
        }

        let parsed: SerpResponse = resp
            .json()
            .await
            .map_err(|e| format!("search response parse: {}", e))?;

        Ok(parsed
            .organic
            .into_iter()
            .filter(|h| !h.link.is_empty())
            .take(max_results)
            .map(|h| SearchHit {
                url: h.link,
                title: h.title,
                snippet: h.snippet,
            })
            .collect())
    }
}

/// 静态提供方：固定命中列表（测试 / 离线运行）
#[derive(Default)]
pub struct StaticSearchProvider {
    hits: Vec<SearchHit>,
}

impl StaticSearchProvider {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchHit>, String> {
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// 恒定失败的提供方（测试协作方失败路径）
#[derive(Default)]
pub struct FailingSearchProvider;

#[async_trait]
impl SearchProvider for FailingSearchProvider {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<SearchHit>, String> {
        Err("search provider unavailable".to_string())
    }
}

/// Search Handler：逐查询调用提供方，命中转为候选与知识
pub struct SearchHandler {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl SearchHandler {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        Self {
            provider,
            max_results,
        }
    }
}

#[async_trait]
impl ActionHandler for SearchHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Search
    }

    async fn execute(&self, decision: &Decision, _ctx: &ExecutionContext) -> HandlerOutcome {
        let ActionParams::Search { queries } = &decision.params else {
            return HandlerOutcome::failed("search handler got non-search params");
        };

        let mut outcome = HandlerOutcome::ok();
        let mut failures = Vec::new();

        // 顺序执行：一次只挂一个外部搜索
        for query in queries {
            match self.provider.search(query, self.max_results).await {
                Ok(hits) => {
                    for hit in hits {
                        if !hit.snippet.trim().is_empty() {
                            outcome.knowledge.push(KnowledgeDraft::new(
                                hit.url.clone(),
                                format!("Title: {}\nSnippet: {}", hit.title, hit.snippet),
                            ));
                        }
                        outcome.discovered.push(hit);
                    }
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "search query failed");
                    failures.push(format!("{}: {}", query, e));
                }
            }
        }

        if !failures.is_empty() {
            outcome.error = Some(failures.join("; "));
            // 全部查询都失败才算本步失败
            if failures.len() == queries.len() {
                outcome.success = false;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::decision::DecisionOrigin;

    fn decision(queries: Vec<&str>) -> Decision {
        Decision {
            think: String::new(),
            params: ActionParams::Search {
                queries: queries.into_iter().map(String::from).collect(),
            },
            origin: DecisionOrigin::Model,
        }
    }

    fn hit(url: &str, title: &str, snippet: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: title.to_string(),
            snippet: snippet.to_string(),
        }
    }

    #[tokio::test]
    async fn test_hits_become_knowledge_and_candidates() {
        let provider = StaticSearchProvider::new(vec![
            hit("https://a", "A", "snippet a"),
            hit("https://b", "B", ""),
        ]);
        let handler = SearchHandler::new(Arc::new(provider), 5);

        let outcome = handler
            .execute(&decision(vec!["q"]), &ExecutionContext::default())
            .await;
        assert!(outcome.success);
        // 空摘要的命中仍进候选，但不产知识
        assert_eq!(outcome.discovered.len(), 2);
        assert_eq!(outcome.knowledge.len(), 1);
        assert!(outcome.knowledge[0].summary.starts_with("Title: A"));
        assert_eq!(outcome.knowledge[0].source_id, "https://a");
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_fatal() {
        let handler = SearchHandler::new(Arc::new(FailingSearchProvider), 5);
        let outcome = handler
            .execute(&decision(vec!["q1", "q2"]), &ExecutionContext::default())
            .await;
        assert!(!outcome.success);
        assert!(outcome.knowledge.is_empty());
        assert!(outcome.error.unwrap().contains("unavailable"));
    }
}
