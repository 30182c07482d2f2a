//! Agent 错误类型
//!
//! 协作方失败（搜索/抓取/模型/沙箱）在各自 Handler 内部消化为失败结果，畸形模型输出由
//! 路由回退吸收，都不会以错误形式离开主循环；这里只剩「进入循环前的校验失败」与
//! 「调用方取消」两类边界。

use thiserror::Error;

/// 研究运行对外可见的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid question: {0}")]
    InvalidQuestion(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Cancelled")]
    Cancelled,
}
