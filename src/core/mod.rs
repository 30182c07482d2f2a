//! 核心层：错误类型与运行状态定义

pub mod error;
pub mod state;

pub use error::AgentError;
pub use state::{RunPhase, RunReport, TerminationReason};
