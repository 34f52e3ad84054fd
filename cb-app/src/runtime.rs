//! Process wiring: config, queues, responder task and the reconnect loop.

use crate::config::BotConfig;
use crate::generator::{Generator, LlmGenerator};
use crate::responder::Responder;
use anyhow::Result;
use cb_irc::{ChatMessage, Disconnect, IrcClient, IrcError, SendRequest};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

const RECONNECT_BASE_MS: u64 = 250;
const RECONNECT_MAX_MS: u64 = 30_000;
const STABLE_SESSION: Duration = Duration::from_secs(30);

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = BotConfig::load(config_path).await?;
    let client = cfg.client_config()?;
    let llm = cfg.llm_client()?;
    tracing::info!(
        identity = %client.identity(),
        channels = ?client.channels(),
        endpoint = %client.endpoint(),
        aliases = ?cfg.aliases(),
        cache_capacity = cfg.responder.cache_capacity,
        model = %llm.model(),
        temperature = llm.temperature(),
        llm_base_url = %cfg.llm.base_url,
        llm_timeout_seconds = cfg.llm.timeout_seconds,
        "config ok"
    );
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = BotConfig::load(config_path).await?;
    let client_config = cfg.client_config()?;
    let generator: Arc<dyn Generator> = Arc::new(LlmGenerator::new(cfg.llm_client()?));
    tracing::info!(
        identity = %client_config.identity(),
        channels = ?client_config.channels(),
        endpoint = %client_config.endpoint(),
        model = %generator.name(),
        cache_capacity = cfg.responder.cache_capacity,
        "chatterbot starting"
    );

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let responder = Responder::new(
        generator,
        &cfg.aliases(),
        cfg.responder.persona.clone(),
        cfg.responder.cache_capacity,
        outbound_tx,
    );
    let responder_handle = tokio::spawn(responder.run(inbound_rx, shutdown.child_token()));

    let irc = IrcClient::new(client_config);
    let result = run_connection(&irc, &inbound_tx, &mut outbound_rx, &shutdown).await;

    shutdown.cancel();
    drop(inbound_tx);
    match responder_handle.await {
        Ok(()) => tracing::info!("responder shutdown completed"),
        Err(e) => tracing::error!(error = %e, "responder task join failed during shutdown"),
    }
    result
}

/// Keep a session alive until shutdown or an authentication failure.
#[tracing::instrument(level = "info", skip_all, fields(endpoint = %irc.config().endpoint()))]
async fn run_connection(
    irc: &IrcClient,
    inbound_tx: &UnboundedSender<ChatMessage>,
    outbound_rx: &mut UnboundedReceiver<SendRequest>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut consecutive_failures: u32 = 0;
    loop {
        let started = Instant::now();
        match irc.connect_and_run(inbound_tx, outbound_rx, shutdown).await {
            Ok(Disconnect::Shutdown) => {
                tracing::info!("connection loop stopped by shutdown");
                return Ok(());
            }
            Ok(disconnect @ Disconnect::TransportClosed { .. }) => {
                if was_stable(&disconnect, started.elapsed()) {
                    consecutive_failures = 0;
                }
                consecutive_failures = consecutive_failures.saturating_add(1);
                tracing::warn!(
                    ?disconnect,
                    attempt = consecutive_failures,
                    "chat session closed; reconnecting"
                );
            }
            Err(error @ IrcError::Connect { .. }) => {
                consecutive_failures = consecutive_failures.saturating_add(1);
                tracing::warn!(
                    %error,
                    attempt = consecutive_failures,
                    "chat connect failed; retrying"
                );
            }
            Err(error) => {
                tracing::error!(%error, "chat connection failed permanently");
                return Err(error.into());
            }
        }

        let delay = reconnect_delay(consecutive_failures);
        tracing::debug!(?delay, "waiting before reconnect");
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// A session counts as healthy once the server answered and it stayed up for a
/// while; only then does the backoff start over.
fn was_stable(disconnect: &Disconnect, lifetime: Duration) -> bool {
    disconnect.reached_active() && lifetime >= STABLE_SESSION
}

fn reconnect_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.saturating_sub(1).min(10);
    Duration::from_millis((RECONNECT_BASE_MS * multiplier).min(RECONNECT_MAX_MS))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; shutting down");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; shutting down");
            }
            _ = shutdown.cancelled() => return,
        }
    }
    #[cfg(not(unix))]
    {
        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => tracing::warn!("received ctrl-c; shutting down"),
                Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
            },
            _ = shutdown.cancelled() => return,
        }
    }
    shutdown.cancel();
}
