use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};

use waav_realtime::{
    ClientConfig,
    core::audio::{AudioRead, AudioWrite, IoSink, IoSource},
    core::realtime::{
        ApiError, RealtimeSession, ServerEvent, SessionState, Tool, ToolCall, ToolError, ToolProperty,
        ToolResult,
    },
};

/// Sample rate used by `--phone`
const PHONE_SAMPLE_RATE: u32 = 8000;

/// WaaV Realtime - voice conversation with the OpenAI Realtime API
///
/// Captured audio is read as raw 16-bit mono PCM at the device sample rate
/// from `--input` (stdin by default). Agent audio is written in the same
/// format to `--output` (stdout by default). Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "waav-realtime")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Instructions sent to the agent
    #[arg(long = "instruction")]
    instruction: Option<String>,

    /// Device sample rate in Hz
    #[arg(long = "sample-rate")]
    sample_rate: Option<u32>,

    /// Emulate 8kHz phone audio
    #[arg(long = "phone")]
    phone: bool,

    /// Enable debug logs
    #[arg(long = "debug")]
    debug: bool,

    /// Raw PCM capture source
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: Option<PathBuf>,

    /// Raw PCM playback sink
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Ask the agent to speak first
    #[arg(long = "greet")]
    greet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing; stdout may carry audio
    tracing_subscriber::fmt()
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .with_writer(io::stderr)
        .init();

    // Initialize crypto provider for TLS connections
    // This must be done before any TLS connections are attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // Load configuration from file or environment
    let mut config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from {}", config_path.display());
        ClientConfig::from_file(config_path).map_err(|e| anyhow!(e.to_string()))?
    } else {
        ClientConfig::from_env().map_err(|e| anyhow!(e.to_string()))?
    };
    if let Some(instruction) = cli.instruction.clone() {
        config.instructions = instruction;
    }
    if let Some(rate) = cli.sample_rate {
        config.sample_rate = rate;
    }
    if cli.phone {
        config.sample_rate = PHONE_SAMPLE_RATE;
    }
    let config = config.with_tools(builtin_tools());
    info!(model = %config.model, sample_rate = config.sample_rate, "Starting session");

    let cancel = CancellationToken::new();
    let session = RealtimeSession::new(config).map_err(|e| anyhow!(e.to_string()))?;
    register_handlers(&session, cancel.clone());

    session
        .open(cancel.clone())
        .await
        .map_err(|e| anyhow!("Failed to open session: {}", e))?;
    info!(session_id = ?session.session_id(), "Session ready");

    let (mut playback, mut capture) = session.audio_endpoints()?;
    let frame_size = session.audio().device_frame_size();

    // Agent audio -> output
    let mut sink: IoSink<Box<dyn Write + Send>> = IoSink(match &cli.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    });
    let playback_thread = std::thread::spawn(move || {
        let mut frame = vec![0u8; frame_size];
        loop {
            match playback.read(&mut frame) {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(e) = sink.write(&frame[..n]) {
                        tracing::error!("Playback write failed: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Playback read failed: {}", e);
                    break;
                }
            }
        }
    });

    // Input -> session
    let mut source: IoSource<Box<dyn Read + Send>> = IoSource(match &cli.input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin()),
    });
    std::thread::spawn(move || {
        let mut chunk = vec![0u8; frame_size];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => {
                    tracing::debug!("Capture source exhausted");
                    break;
                }
                Ok(n) => {
                    // Keep whole samples only
                    let n = n - n % 2;
                    if let Err(e) = capture.write(&chunk[..n]) {
                        tracing::debug!("Capture stopped: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Capture read failed: {}", e);
                    break;
                }
            }
        }
    });

    if cli.greet {
        session
            .create_response()
            .await
            .map_err(|e| anyhow!(e.to_string()))?;
    }

    let mut state = session.subscribe_state();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = cancel.cancelled() => info!("Conversation ended"),
        _ = state.wait_for(|s| *s == SessionState::Closed) => info!("Session closed by service"),
    }

    session.close().await.map_err(|e| anyhow!(e.to_string()))?;
    let _ = playback_thread.join();

    Ok(())
}

fn builtin_tools() -> Vec<Tool> {
    vec![
        Tool::function(
            "conversation_end",
            "Use to end the conversation for various reasons. User may have asked for it. You see \
             a dead end or you think the case is closed. If you think you should end the \
             conversation, ask the user if its okay, then before you end, say good bye and only \
             after the user confirmed with good bye end it.",
        )
        .with_property(
            "summary",
            ToolProperty::string("Concise summary of the conversation"),
            true,
        )
        .with_property(
            "reason",
            ToolProperty::string(
                "The reason for ending the conversation. If you don't specify a reason, the \
                 default reason is 'user'.",
            ),
            true,
        ),
        Tool::function("get_time", "Get current time"),
    ]
}

fn run_tool(call: &ToolCall, cancel: &CancellationToken) -> ToolResult {
    match call.name.as_str() {
        "get_time" => Ok(Some(serde_json::Value::String(current_time_utc()))),
        "conversation_end" => {
            let reason = call
                .arguments
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or("user");
            let summary = call
                .arguments
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            eprintln!("agent> end conversation: {}", reason);
            eprintln!("summary>\n{}", summary);
            cancel.cancel();
            Ok(Some(serde_json::Value::String("OK".to_string())))
        }
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

fn register_handlers(session: &RealtimeSession, cancel: CancellationToken) {
    session.on_event(Arc::new(|event: ServerEvent| {
        async move {
            match event {
                ServerEvent::AudioTranscriptDelta { .. } => eprint!("."),
                ServerEvent::AudioTranscriptDone { transcript, .. } => {
                    eprintln!("\nagent> {}", transcript)
                }
                ServerEvent::SpeechStarted { .. } => eprintln!("user> ..."),
                other => tracing::debug!(event = other.kind(), "Server event"),
            }
        }
        .boxed()
    }));

    session.on_error(Arc::new(|error: ApiError| {
        async move {
            tracing::error!(error_type = %error.error_type, "Realtime API error: {}", error);
        }
        .boxed()
    }));

    session.on_tool_call(Arc::new(move |call: ToolCall| {
        let result = run_tool(&call, &cancel);
        async move { result }.boxed()
    }));
}

/// RFC 3339 timestamp in UTC.
fn current_time_utc() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
