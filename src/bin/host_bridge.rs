//! Headless host bridge binary for stdin/stdout JSON communication.
//!
//! Reads `CommandRequest` messages as newline-delimited JSON from stdin,
//! runs each through the assistant pipeline, and writes `CommandResponse`
//! and `EventEnvelope` messages to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use campus_voice::config::AssistantConfig;
use campus_voice::host::stdio::run_stdio_bridge;
use campus_voice::pipeline::AssistantPipeline;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise tracing to stderr only (stdout is reserved for the JSON
    // protocol).
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("campus_voice=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(std::path::PathBuf::from)
        .unwrap_or_else(AssistantConfig::default_config_path);
    let config = if config_path.exists() {
        AssistantConfig::from_file(&config_path)
            .map_err(|e| anyhow::anyhow!("failed to load {}: {e}", config_path.display()))?
    } else {
        tracing::info!(path = %config_path.display(), "no config file; using defaults");
        AssistantConfig::default()
    };

    let pipeline = AssistantPipeline::from_config(&config)
        .map_err(|e| anyhow::anyhow!("failed to build pipeline: {e}"))?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received; shutting down");
            ctrl_c.cancel();
        }
    });

    tracing::info!("campus-voice-host starting");

    run_stdio_bridge(pipeline, cancel).await.map_err(|e| {
        tracing::error!(error = %e, "campus-voice-host exited with error");
        anyhow::anyhow!("campus-voice-host failed: {e}")
    })?;

    tracing::info!("campus-voice-host shut down cleanly");
    Ok(())
}
