//! Magpie - Rust 深度研究智能体
//!
//! 在有限 token 预算与步数内自主完成：网络搜索、页面阅读、问题拆解、计算与作答，
//! 由语言模型驱动决策，带停滞检测与回答质量门控，保证必然收束。
//!
//! 模块划分：
//! - **agent**: 无头运行时（组件装配 + run_research 调用面）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、运行阶段与报告
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 运行期记忆（token 预算、行动日志、知识仓）
//! - **research**: 决策上下文、动作路由、回答评估、主循环
//! - **tools**: 五种动作 Handler 与外部协作方（搜索 / 抓取 / 沙箱）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod research;
pub mod tools;

pub use agent::{create_agent_components, run_research, AgentComponents};
pub use crate::core::{AgentError, RunPhase, RunReport, TerminationReason};
