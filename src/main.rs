//! guidance-overlay: screen state & guidance overlay engine.
//!
//! Speaks newline-delimited JSON on stdin/stdout so a conversational host can
//! drive it with tool calls:
//!
//! ```text
//! {"tool":"capture"}
//! {"tool":"place","basis":"percent","x":50,"y":90,"direction":"up"}
//! {"tool":"place","basis":"image_pixel","x":683,"y":384}
//! {"tool":"context"}
//! {"tool":"clear"}
//! ```
//!
//! Analysis requests raised by the engine are written to stdout as
//! `{"event":"analysis_requested",...}` lines.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use guidance_overlay::auto_capture::AnalysisHandler;
use guidance_overlay::config::EngineConfig;
use guidance_overlay::context::ScreenFrame;
use guidance_overlay::engine::{GuidanceEngine, PlacementRequest};

#[derive(Debug, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
enum ToolCall {
    Capture,
    Place(PlacementRequest),
    Context,
    Clear,
    Dismiss {
        #[serde(default)]
        reason: Option<String>,
    },
    Status,
}

/// Forwards analysis requests to the host as stdout events
struct HostAnalysisHandler {
    out: mpsc::UnboundedSender<Value>,
}

#[async_trait]
impl AnalysisHandler for HostAnalysisHandler {
    async fn analyze(&self, frame: Arc<ScreenFrame>, reason: &str) -> anyhow::Result<()> {
        self.out
            .send(json!({
                "event": "analysis_requested",
                "reason": reason,
                "frame": frame_summary(&frame),
            }))
            .context("Output channel closed")?;
        Ok(())
    }
}

fn frame_summary(frame: &ScreenFrame) -> Value {
    json!({
        "id": frame.id,
        "path": frame.path,
        "width": frame.width,
        "height": frame.height,
        "colors": frame.colors,
        "display_bounds": frame.display_bounds,
        "captured_at": frame.captured_at,
        "digest": frame.digest,
    })
}

async fn handle_call(engine: &GuidanceEngine, call: ToolCall) -> Result<Value> {
    let result = match call {
        ToolCall::Capture => {
            let frame = engine.capture_now().await?;
            frame_summary(&frame)
        }
        ToolCall::Place(request) => serde_json::to_value(engine.place_overlay(&request)?)?,
        ToolCall::Context => serde_json::to_value(engine.screen_context())?,
        ToolCall::Clear => json!({ "cleared": engine.clear_overlays() }),
        ToolCall::Dismiss { reason } => {
            let reason = reason.unwrap_or_else(|| "dismissed by host".to_string());
            json!({ "dismissed": engine.dismiss_overlays(&reason) })
        }
        ToolCall::Status => json!({
            "auto_capture": engine.last_capture_info(),
            "overlay_visible": engine.overlay().is_visible(),
            "session": engine.session(),
            "metrics": engine.metrics(),
        }),
    };
    Ok(result)
}

async fn handle_line(engine: &GuidanceEngine, line: &str) -> Value {
    let call: ToolCall = match serde_json::from_str(line) {
        Ok(call) => call,
        Err(e) => {
            warn!("[Engine] Malformed tool call: {}", e);
            return json!({ "ok": false, "error": format!("malformed tool call: {}", e) });
        }
    };

    match handle_call(engine, call).await {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(e) => {
            warn!("[Engine] Tool call failed: {:#}", e);
            json!({ "ok": false, "error": format!("{:#}", e) })
        }
    }
}

async fn write_output(mut rx: mpsc::UnboundedReceiver<Value>) {
    let mut stdout = tokio::io::stdout();
    while let Some(value) = rx.recv().await {
        let mut line = value.to_string();
        line.push('\n');
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            error!("[Engine] Failed to write to stdout: {}", e);
            break;
        }
        let _ = stdout.flush().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("guidance-overlay v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::from_env().context("Failed to load configuration")?;
    let engine = GuidanceEngine::builder(config).build();

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_output(out_rx));

    engine.set_analysis_handler(Arc::new(HostAnalysisHandler { out: out_tx.clone() }));
    engine.start();

    info!("[Engine] Ready for tool calls on stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("[Engine] stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("[Engine] Failed to read stdin: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let response = handle_line(&engine, line).await;
                if out_tx.send(response).is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("[Engine] Interrupted");
                break;
            }
        }
    }

    engine.shutdown();
    drop(out_tx);
    drop(engine);
    let _ = writer.await;

    Ok(())
}
