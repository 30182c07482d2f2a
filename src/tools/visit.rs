//! Visit 动作与页面抓取
//!
//! 抓取走现代浏览器 UA 与常用请求头；HTML 响应用 html2text 提取可读文本，失败时退到
//! 简易去标签；超过 max_content_chars 截断并追加 ...[truncated]。
//! index 解析不到候选按跳过处理（不是错误）；单步内并发抓取受 Semaphore 限制。

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use html2text::from_read;
use reqwest::Client;
use tokio::sync::Semaphore;

use crate::config::VisitSection;
use crate::memory::KnowledgeDraft;
use crate::research::decision::{ActionKind, ActionParams, Decision};
use crate::tools::handler::{ActionHandler, ExecutionContext, HandlerOutcome};

/// 页面抓取抽象：URL -> 可读文本
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, String>;
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut prev_whitespace = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                let is_whitespace = c.is_whitespace();
                if is_whitespace && prev_whitespace {
                    continue;
                }
                prev_whitespace = is_whitespace;
                out.push(if is_whitespace { ' ' } else { c });
            }
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

/// HTTP 页面抓取：GET 带超时与 UA，HTML 转文本并截断
pub struct HttpPageFetcher {
    client: Client,
    max_content_chars: usize,
}

impl HttpPageFetcher {
    pub fn new(cfg: &VisitSection) -> Self {
        // 使用现代浏览器 UA 与常用请求头，避免被站点识别为爬虫
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers({
                use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
                let mut h = reqwest::header::HeaderMap::new();
                h.insert(
                    ACCEPT,
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                        .parse()
                        .unwrap(),
                );
                h.insert(ACCEPT_LANGUAGE, "en-US,en;q=0.9".parse().unwrap());
                h
            })
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_content_chars: cfg.max_content_chars,
        }
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let mut body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;

        // 去除 BOM，避免 HTML 检测失败
        if body.starts_with('\u{FEFF}') {
            body = body[1..].to_string();
        }

        let body = if looks_like_html(&body) {
            self.html_to_text(&body)
        } else {
            body
        };

        let len = body.chars().count();
        if len > self.max_content_chars {
            Ok(body.chars().take(self.max_content_chars).collect::<String>()
                + "\n...[truncated]")
        } else {
            Ok(body)
        }
    }
}

/// 静态抓取器：URL -> 固定文本（测试 / 离线运行）
#[derive(Default)]
pub struct StaticPageFetcher {
    pages: std::collections::HashMap<String, String>,
}

impl StaticPageFetcher {
    pub fn new(pages: Vec<(&str, &str)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(u, c)| (u.to_string(), c.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl PageFetcher for StaticPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| format!("no page for {}", url))
    }
}

/// Visit Handler：解析候选 index，受限并发抓取，成功页转知识
pub struct VisitHandler {
    fetcher: Arc<dyn PageFetcher>,
    concurrency: usize,
}

impl VisitHandler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }
}

#[async_trait]
impl ActionHandler for VisitHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Visit
    }

    async fn execute(&self, decision: &Decision, ctx: &ExecutionContext) -> HandlerOutcome {
        let ActionParams::Visit { targets } = &decision.params else {
            return HandlerOutcome::failed("visit handler got non-visit params");
        };

        // index -> URL；解析不到的跳过
        let urls: Vec<String> = targets
            .iter()
            .filter_map(|i| ctx.candidates.iter().find(|c| c.index == *i))
            .map(|c| c.url.clone())
            .collect();

        let mut outcome = HandlerOutcome::ok();
        if urls.is_empty() {
            return outcome;
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let fetches = urls.iter().map(|url| {
            let fetcher = self.fetcher.clone();
            let semaphore = semaphore.clone();
            let url = url.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = fetcher.fetch(&url).await;
                (url, result)
            }
        });

        let mut failures = Vec::new();
        for (url, result) in join_all(fetches).await {
            outcome.visited.push(url.clone());
            match result {
                Ok(content) => {
                    outcome
                        .knowledge
                        .push(KnowledgeDraft::new(url, content));
                }
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "page fetch failed");
                    failures.push(format!("{}: {}", url, e));
                }
            }
        }

        if !failures.is_empty() {
            outcome.error = Some(failures.join("; "));
        }

        outcome
    }
}
