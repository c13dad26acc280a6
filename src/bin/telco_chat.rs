//! Interactive telco customer-service chat on stdin.
//!
//! Reads `OPENAI_API_KEY` and the `SWITCHBOARD_*` settings from the
//! environment. `SWITCHBOARD_PASSAGES` may point at a text file with one
//! contract passage per line. Type `quit` to end the session.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use switchboard::config::from_env;
use switchboard::telco::{build_registry, TelcoContext};
use switchboard::{InMemoryPassages, OpenAIProvider, RunConfig, Runner, SessionManager};

fn load_passages() -> InMemoryPassages {
    let Ok(path) = std::env::var("SWITCHBOARD_PASSAGES") else {
        return InMemoryPassages::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let passages = InMemoryPassages::from_lines(&text);
            info!(path = %path, count = passages.len(), "Loaded contract passages");
            passages
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Could not read contract passages");
            InMemoryPassages::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info".into()),
        )
        .with_target(true)
        .compact()
        .init();

    let config = from_env()?;
    let provider = Arc::new(OpenAIProvider::new());
    let registry = build_registry(provider.clone(), Arc::new(load_passages()), &config)?;
    let runner = Runner::new(Arc::new(registry), provider, RunConfig::from(&config));
    let manager: SessionManager<TelcoContext> = SessionManager::new(runner);

    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session = %session_id, "Chat started");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message.eq_ignore_ascii_case("quit") {
            break;
        }

        let reply = manager.handle(&session_id, message).await;
        let text = format!("[{} | {:?}] {}\n", reply.agent, reply.outcome, reply.response);
        stdout.write_all(text.as_bytes()).await?;
    }

    if let Some(ctx) = manager.context_snapshot(&session_id).await {
        info!(
            session = %session_id,
            account = ctx.account_number_or_unknown(),
            "Chat finished"
        );
    }
    manager.end_session(&session_id).await;
    Ok(())
}
