//! 交互式 REPL：读入用户输入，驱动 ReAct 回合并打印最终回复
//!
//! 命令：!exit 退出，!reset 清空对话历史与 Scratchpad。

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use forge::config::load_config;
use forge::llm::{OpenAiClient, RetryConfig, RetryingClient};
use forge::memory::Message;
use forge::tools::EchoTool;
use forge::{observability, AgentConfig, AgentSession};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_default();
    let base = OpenAiClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        std::env::var("FORGE_API_KEY").ok().as_deref(),
    )
    .with_request_timeout(Duration::from_secs(cfg.llm.request_timeout_secs));
    let llm = Arc::new(RetryingClient::new(
        Arc::new(base),
        RetryConfig {
            max_attempts: cfg.llm.retry.max_attempts,
            base_delay_ms: cfg.llm.retry.base_delay_ms,
        },
    ));

    let cancel = CancellationToken::new();
    let session = AgentSession::new(llm, AgentConfig::from_app_config(&cfg))
        .with_cancel_token(cancel.clone());
    session.registry().register(EchoTool);

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    println!("forge agent ready ({} tools). Commands: !exit, !reset",
        session.registry().tool_names().len());

    let mut history: Vec<Message> = Vec::new();
    let stdin = std::io::stdin();
    loop {
        print!("you > ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input {
            "!exit" => break,
            "!reset" => {
                history.clear();
                session.scratchpad().clear();
                println!("history and scratchpad cleared");
                continue;
            }
            _ => {}
        }

        match session.run_turn(history.clone(), input).await {
            Ok(outcome) => {
                println!("forge > {}\n", outcome.response);
                history = outcome.messages;
            }
            Err(e) => {
                eprintln!("error: {e}");
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
    }

    println!("session ended");
    Ok(())
}
