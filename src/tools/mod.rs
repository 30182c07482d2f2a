//! 动作层：五种动作 Handler 与其包装的外部协作方（搜索 / 抓取 / 沙箱）

pub mod answer;
pub mod coding;
pub mod handler;
pub mod reflect;
pub mod search;
pub mod visit;

pub use answer::AnswerHandler;
pub use coding::{CodeExecutor, CodingHandler, HttpSandboxExecutor, StaticCodeExecutor, COMPUTATION_SOURCE};
pub use handler::{ActionHandler, ExecutionContext, HandlerExecutor, HandlerOutcome, HandlerRegistry};
pub use reflect::ReflectHandler;
pub use search::{
    FailingSearchProvider, HttpSearchProvider, SearchHandler, SearchHit, SearchProvider,
    StaticSearchProvider,
};
pub use visit::{HttpPageFetcher, PageFetcher, StaticPageFetcher, VisitHandler};
