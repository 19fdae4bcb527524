//! Startup helpers for the assistant binaries.
//!
//! `run()` drives the HTTP server, `run_chat()` the terminal chat. Both read
//! the configuration from the environment and report failures through their
//! exit code.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::config::AgentConfig;
use crate::common::ids::SessionId;
use crate::conversation::{ConversationStore, Role};
use crate::database::{DocumentDatabase, MongoDatabase};
use crate::llm::build_completion;
use crate::pipeline::ChatPipeline;
use crate::server::{self, AppState};

/// Terminal command that clears the conversation.
pub const CLEAR_COMMAND: &str = "/clear";
/// Terminal commands that end the chat.
pub const QUIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];

/// Install the global tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Build the chat pipeline, connecting to MongoDB unless lookups are delegated.
///
/// # Errors
/// Returns an error if the completion provider or the database cannot be set up.
pub async fn build_pipeline(config: &AgentConfig) -> anyhow::Result<ChatPipeline> {
    let completion = build_completion(&config.llm).context("Failed to create completion client")?;

    let database: Option<Arc<dyn DocumentDatabase>> = if config.tool.delegate_endpoint.is_some() {
        None
    } else {
        let database = MongoDatabase::connect(&config.database)
            .await
            .context("Failed to connect to MongoDB")?;
        Some(Arc::new(database) as Arc<dyn DocumentDatabase>)
    };

    ChatPipeline::from_config(config, completion, database).context("Failed to build pipeline")
}

async fn serve(config: AgentConfig) -> anyhow::Result<()> {
    let port = config.server.port;
    let pipeline = build_pipeline(&config).await?;
    let state = AppState::new(config, pipeline);

    server::run_server_with_shutdown(state, port, shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {e}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

fn load_config() -> Option<AgentConfig> {
    match AgentConfig::from_env() {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            None
        }
    }
}

fn runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => Some(rt),
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            None
        }
    }
}

/// Run the server (used by the `quadz-server` binary).
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("Starting Quadz assistant v{}", env!("CARGO_PKG_VERSION"));

    let Some(config) = load_config() else {
        return ExitCode::from(1);
    };
    let Some(rt) = runtime() else {
        return ExitCode::from(1);
    };

    if let Err(e) = rt.block_on(serve(config)) {
        tracing::error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Run the terminal chat (used by the `quadz-chat` binary).
///
/// Resumes `session` when given, otherwise starts a new session.
#[must_use]
pub fn run_chat(session: Option<String>) -> ExitCode {
    init_tracing();

    let session_id = match session.as_deref().map(str::parse::<SessionId>) {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            tracing::error!("{e}");
            return ExitCode::from(1);
        }
        None => SessionId::generate(),
    };
    let Some(config) = load_config() else {
        return ExitCode::from(1);
    };
    let Some(rt) = runtime() else {
        return ExitCode::from(1);
    };

    let result = rt.block_on(async {
        let pipeline = build_pipeline(&config).await?;
        let store = ConversationStore::open(
            &config.storage.sessions_dir,
            session_id,
            config.storage.greeting.clone(),
        );
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        chat_loop(&pipeline, &store, stdin, tokio::io::stdout()).await
    });

    if let Err(e) = result {
        tracing::error!("{e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

/// Line-oriented chat: replay the history, then answer one line at a time
/// until end of input or a quit command.
///
/// # Errors
/// Returns an error if reading input or writing output fails.
pub async fn chat_loop<R, W>(
    pipeline: &ChatPipeline,
    store: &ConversationStore,
    input: R,
    mut output: W,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output
        .write_all(format!("Session {}\n", store.session_id()).as_bytes())
        .await?;
    for message in store.resolved_messages().await {
        let speaker = match message.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        write_reply(&mut output, speaker, &message.reply.to_text()).await?;
    }

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&line) {
            break;
        }
        if line == CLEAR_COMMAND {
            store.clear().await.context("Failed to clear conversation")?;
            for message in store.resolved_messages().await {
                write_reply(&mut output, "assistant", &message.reply.to_text()).await?;
            }
            continue;
        }

        let reply = pipeline.respond(store, line).await;
        write_reply(&mut output, "assistant", &reply.to_text()).await?;
    }
    Ok(())
}

async fn write_reply<W: AsyncWrite + Unpin>(output: &mut W, speaker: &str, text: &str) -> anyhow::Result<()> {
    output.write_all(format!("{speaker}> {text}\n").as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
