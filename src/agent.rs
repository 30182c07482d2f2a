//! 无头 Agent 运行时
//!
//! create_agent_components 按配置构建 LLM / 路由 / 五个动作 Handler / 评估器，
//! run_research 对单个问题跑研究主循环并返回报告。供 CLI 或服务端前端调用。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{AgentSection, AppConfig};
use crate::core::{AgentError, RunReport};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::research::{
    research_loop, ActionRouter, AnswerEvaluator, ResearchEvent, ResearchSession,
};
use crate::tools::{
    AnswerHandler, CodeExecutor, CodingHandler, HandlerExecutor, HandlerRegistry, HttpPageFetcher,
    HttpSandboxExecutor, HttpSearchProvider, PageFetcher, ReflectHandler, SearchHandler,
    SearchProvider, StaticSearchProvider, VisitHandler,
};

/// 预构建的 Agent 组件：LLM、路由、Handler 执行器与 [agent] 配置，可多次运行复用
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub router: ActionRouter,
    pub executor: HandlerExecutor,
    pub agent_cfg: AgentSection,
}

/// 根据配置与环境变量选择 LLM 后端（OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider != "mock" && std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
        Arc::new(
            OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            )
            .with_sampling(cfg.llm.temperature, cfg.llm.max_tokens),
        )
    } else {
        tracing::warn!("No API key set or provider is mock, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 用给定的协作方实现组装组件（测试与自定义后端入口）
pub fn assemble_components(
    llm: Arc<dyn LlmClient>,
    search_provider: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn PageFetcher>,
    code_executor: Arc<dyn CodeExecutor>,
    cfg: &AppConfig,
) -> AgentComponents {
    let mut registry = HandlerRegistry::new();
    registry.register(SearchHandler::new(
        search_provider,
        cfg.tools.search.max_results,
    ));
    registry.register(VisitHandler::new(fetcher, cfg.tools.visit.concurrency));
    registry.register(ReflectHandler::new());
    registry.register(AnswerHandler::new(AnswerEvaluator::new(llm.clone())));
    registry.register(CodingHandler::new(code_executor));

    AgentComponents {
        router: ActionRouter::new(llm.clone(), cfg.agent.clone(), cfg.llm.timeouts.request),
        executor: HandlerExecutor::new(registry, cfg.tools.tool_timeout_secs),
        llm,
        agent_cfg: cfg.agent.clone(),
    }
}

/// 创建 Agent 组件：LLM 与各外部协作方均来自配置
///
/// 搜索端点未配置时退化为空结果提供方并告警（运行仍可终止，只是查不到东西）。
pub fn create_agent_components(cfg: &AppConfig) -> AgentComponents {
    let llm = create_llm_from_config(cfg);

    let search_provider: Arc<dyn SearchProvider> = match &cfg.tools.search.endpoint {
        Some(endpoint) => Arc::new(HttpSearchProvider::new(
            &cfg.tools.search,
            endpoint.clone(),
        )),
        None => {
            tracing::warn!("tools.search.endpoint not set, searches will return nothing");
            Arc::new(StaticSearchProvider::default())
        }
    };
    let fetcher = Arc::new(HttpPageFetcher::new(&cfg.tools.visit));
    let sandbox = Arc::new(HttpSandboxExecutor::new(&cfg.tools.sandbox));

    assemble_components(llm, search_provider, fetcher, sandbox, cfg)
}

/// 处理单个问题：跑研究主循环，返回回答、引用与收束原因
pub async fn run_research(
    components: &AgentComponents,
    question: &str,
    event_tx: Option<&mpsc::UnboundedSender<ResearchEvent>>,
    cancel_token: CancellationToken,
) -> Result<RunReport, AgentError> {
    let mut session = ResearchSession::new(
        &components.router,
        &components.executor,
        components.llm.clone(),
        &components.agent_cfg,
        cancel_token,
    );
    if let Some(tx) = event_tx {
        session = session.with_event_tx(tx);
    }
    research_loop(&session, question).await
}
