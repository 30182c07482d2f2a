//! Magpie - Rust 深度研究智能体
//!
//! 入口：初始化日志、按配置装配组件，对命令行给出的问题跑一次研究并打印回答与引用。

use anyhow::Context;
use magpie::agent::{create_agent_components, run_research};
use magpie::config::load_config;
use magpie::research::ResearchEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    magpie::observability::init();

    let question: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        anyhow::bail!("usage: magpie <question>");
    }

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let components = create_agent_components(&cfg);

    // 过程事件打到 stderr，最终回答走 stdout
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ResearchEvent>();
    let progress = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match &ev {
                ResearchEvent::StepStarted { step, max_steps } => {
                    eprintln!("[step {}/{}]", step, max_steps);
                }
                ResearchEvent::ActionDecided { action, think, .. } => {
                    eprintln!("  -> {} ({})", action, think);
                }
                ResearchEvent::ActionCompleted {
                    action,
                    ok,
                    knowledge_added,
                    ..
                } => {
                    eprintln!("  <- {} ok={} +{} knowledge", action, ok, knowledge_added);
                }
                ResearchEvent::RunTerminated { phase, reason, .. } => {
                    eprintln!("[done] {:?} ({:?})", phase, reason);
                }
                ResearchEvent::TokenUsage {
                    budget_remaining, ..
                } => {
                    eprintln!("  budget remaining: {}", budget_remaining);
                }
            }
        }
    });

    let cancel_token = CancellationToken::new();
    let report = run_research(&components, &question, Some(&event_tx), cancel_token)
        .await
        .context("research run failed")?;
    drop(event_tx);
    let _ = progress.await;

    println!("{}", report.answer);
    if !report.references.is_empty() {
        println!("\nReferences:");
        for r in &report.references {
            println!("- {}", r);
        }
    }
    tracing::info!(
        steps = report.step_count,
        knowledge = report.knowledge_item_count,
        reason = ?report.termination_reason,
        "run finished"
    );

    Ok(())
}
