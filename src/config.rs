//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MAGPIE__*` 覆盖（双下划线表示嵌套，如 `MAGPIE__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [app] 段：应用名
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、采样参数与超时
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmSection {
    /// 后端：openai 兼容端点 / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 决策请求的采样温度
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 单次补全最大 token 数
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmTimeoutsSection {
    /// 单次决策/评估请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

/// [agent] 段：步数上限、token 预算与停滞检测阈值
///
/// 停滞窗口（loop_window / progress_window）是启发式调参项，按配置暴露而非写死。
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 单次运行最大动作步数
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// 单次运行 token 预算（prompt + completion 累计）
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,
    /// 调用方要求直接收束：首个决策即为强制最终回答
    #[serde(default)]
    pub forced_finalization: bool,
    /// 重复动作判定窗口（最近 N 步完全相同视为打转）
    #[serde(default = "default_stagnation_window")]
    pub loop_window: usize,
    /// 无新知识判定窗口（最近 M 步知识量未增长视为停滞）
    #[serde(default = "default_stagnation_window")]
    pub progress_window: usize,
    /// 决策上下文中展示的知识条数上限
    #[serde(default = "default_knowledge_view")]
    pub knowledge_view: usize,
    /// 决策上下文中展示的行动日志行数上限
    #[serde(default = "default_diary_view")]
    pub diary_view: usize,
    /// 决策上下文中展示的 URL 候选数上限
    #[serde(default = "default_candidate_view")]
    pub candidate_view: usize,
    /// 单条知识摘要在 prompt 中的截断长度（字符）
    #[serde(default = "default_summary_chars")]
    pub summary_chars: usize,
    /// 强制合成回答的最大字符数
    #[serde(default = "default_forced_answer_chars")]
    pub forced_answer_max_chars: usize,
}

fn default_max_steps() -> u32 {
    20
}

fn default_token_budget() -> u64 {
    500_000
}

fn default_stagnation_window() -> usize {
    3
}

fn default_knowledge_view() -> usize {
    20
}

fn default_diary_view() -> usize {
    10
}

fn default_candidate_view() -> usize {
    20
}

fn default_summary_chars() -> usize {
    400
}

fn default_forced_answer_chars() -> usize {
    2000
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            token_budget: default_token_budget(),
            forced_finalization: false,
            loop_window: default_stagnation_window(),
            progress_window: default_stagnation_window(),
            knowledge_view: default_knowledge_view(),
            diary_view: default_diary_view(),
            candidate_view: default_candidate_view(),
            summary_chars: default_summary_chars(),
            forced_answer_max_chars: default_forced_answer_chars(),
        }
    }
}

/// [tools] 段：动作执行超时与各外部协作方配置
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ToolsSection {
    /// 单个动作（含其内部外部调用）超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub visit: VisitSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

/// [tools.search] 段：搜索提供方 HTTP 端点与结果数上限
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    /// SERP 风格 JSON 端点；API Key 从 SEARCH_API_KEY 读取
    pub endpoint: Option<String>,
    /// 提供方标识（随请求发送，供网关路由）
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_provider() -> String {
    "serper".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_search_timeout_secs() -> u64 {
    15
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            provider: default_search_provider(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

/// [tools.visit] 段：页面抓取超时、内容截断与并发上限
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VisitSection {
    #[serde(default = "default_visit_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
    /// 单步内并发抓取上限
    #[serde(default = "default_visit_concurrency")]
    pub concurrency: usize,
}

fn default_visit_timeout_secs() -> u64 {
    15
}

fn default_max_content_chars() -> usize {
    8000
}

fn default_visit_concurrency() -> usize {
    3
}

/// [tools.sandbox] 段：代码执行沙箱端点；未配置时 coding 动作按协作方失败处理
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SandboxSection {
    pub endpoint: Option<String>,
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_sandbox_timeout_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            llm: LlmSection::default(),
            agent: AgentSection::default(),
            tools: ToolsSection::default(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 MAGPIE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MAGPIE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MAGPIE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_steps, 20);
        assert_eq!(cfg.agent.loop_window, 3);
        assert!(!cfg.agent.forced_finalization);
        assert_eq!(cfg.tools.search.max_results, 5);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "[agent]\nmax_steps = 7\ntoken_budget = 1000\n\n[llm]\nmodel = \"test-model\""
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_steps, 7);
        assert_eq!(cfg.agent.token_budget, 1000);
        assert_eq!(cfg.llm.model, "test-model");
        // 未覆盖的键保持默认
        assert_eq!(cfg.agent.progress_window, 3);
    }
}
