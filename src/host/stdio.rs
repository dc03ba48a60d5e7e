//! Newline-delimited JSON bridge over stdin/stdout.
//!
//! Each input line is a [`CommandRequest`]; each gets exactly one
//! [`CommandResponse`] line back. Requests for different sessions run
//! concurrently, so responses may come back out of input order; within a
//! session they run and answer in order. Runtime events are interleaved as
//! [`EventEnvelope`] lines.
//!
//! Stdout is exclusively reserved for the JSON protocol; all diagnostic
//! output (tracing, logs) must be routed to stderr.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::AssistantError;
use crate::host::contract::{CommandRequest, CommandResponse, EventEnvelope};
use crate::pipeline::AssistantPipeline;

/// Run the bridge on the process's stdin/stdout until EOF or `cancel`.
pub async fn run_stdio_bridge(
    pipeline: AssistantPipeline,
    cancel: CancellationToken,
) -> crate::Result<()> {
    run_bridge(
        pipeline,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        cancel,
    )
    .await
}

/// Run the bridge over arbitrary streams.
///
/// Two tasks operate in parallel:
///
/// 1. **Reader** -- reads one request per line and spawns it through the
///    pipeline; each request task writes its own response line.
/// 2. **Event forwarder** -- writes pipeline runtime events as envelopes.
///
/// Returns when the input closes or `cancel` fires.
pub async fn run_bridge<R, W>(
    pipeline: AssistantPipeline,
    reader: R,
    writer: W,
    cancel: CancellationToken,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(BufWriter::new(writer)));

    let event_writer = Arc::clone(&writer);
    let mut event_rx = pipeline.subscribe();
    let event_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => match EventEnvelope::from_runtime(&event)
                    .and_then(|envelope| serde_json::to_string(&envelope))
                {
                    Ok(json) => {
                        let mut w = event_writer.lock().await;
                        if let Err(e) = write_line(&mut *w, &json).await {
                            tracing::warn!(
                                error = %e,
                                "failed to write event envelope; stopping event forwarder"
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize event envelope; skipping");
                    }
                },
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!(lagged = n, "event forwarder lagged; some events were dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = run_reader(&pipeline, reader, &writer, &cancel).await;

    event_handle.abort();
    let _ = event_handle.await;
    result
}

async fn run_reader<R, W>(
    pipeline: &AssistantPipeline,
    mut reader: R,
    writer: &Arc<Mutex<BufWriter<W>>>,
    cancel: &CancellationToken,
) -> crate::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut line = String::new();
    let mut in_flight = JoinSet::new();
    // Completion token of the latest request per session; the next request
    // for that session waits on it.
    let mut session_tails: HashMap<String, CancellationToken> = HashMap::new();

    let result = loop {
        line.clear();
        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("bridge cancelled");
                break Ok(());
            }
            read = reader.read_line(&mut line) => read,
        };
        let bytes_read = match read {
            Ok(n) => n,
            Err(e) => break Err(AssistantError::Channel(format!("failed to read request line: {e}"))),
        };

        if bytes_read == 0 {
            tracing::info!("input closed (EOF); shutting down bridge");
            break Ok(());
        }

        while let Some(joined) = in_flight.try_join_next() {
            log_join(joined);
        }
        session_tails.retain(|_, done| !done.is_cancelled());

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<CommandRequest>(trimmed) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, raw_line = %trimmed, "failed to parse command request");
                let response = CommandResponse::error(format!("failed to parse command request: {e}"));
                if let Err(e) = write_response(writer, &response).await {
                    break Err(e);
                }
                continue;
            }
        };

        let done = CancellationToken::new();
        let previous = session_tails.insert(request.session_id.clone(), done.clone());
        let pipeline = pipeline.clone();
        let writer = Arc::clone(writer);
        let request_cancel = cancel.child_token();
        in_flight.spawn(async move {
            let _done = done.drop_guard();
            if let Some(previous) = previous {
                previous.cancelled().await;
            }
            let response = pipeline.handle_command(request, &request_cancel).await;
            if let Err(e) = write_response(&writer, &response).await {
                tracing::warn!(error = %e, "failed to write command response");
            }
        });
    };

    while let Some(joined) = in_flight.join_next().await {
        log_join(joined);
    }
    result
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "command task failed");
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &Mutex<BufWriter<W>>,
    response: &CommandResponse,
) -> crate::Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| AssistantError::Channel(format!("failed to serialize response: {e}")))?;
    let mut w = writer.lock().await;
    write_line(&mut *w, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W: AsyncWrite + Unpin>(writer: &mut BufWriter<W>, json: &str) -> crate::Result<()> {
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| AssistantError::Channel(format!("failed to write output: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| AssistantError::Channel(format!("failed to write newline: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| AssistantError::Channel(format!("failed to flush output: {e}")))?;
    Ok(())
}
