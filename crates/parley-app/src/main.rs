//! Parley application binary - composition root.
//!
//! 1. Parse CLI arguments, read `.env`, and load configuration from TOML
//! 2. Initialize tracing (stderr, so stdout carries only the conversation)
//! 3. Build the inference gateway and the microphone
//! 4. Run the interactive prompt against a `ChatSession`

mod cli;
mod commands;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use parley_audio::Microphone;
use parley_core::config::AudioConfig;
use parley_core::{Message, ParleyConfig};
use parley_gateway::{HuggingFaceGateway, InferenceGateway};
use parley_session::{ChatSession, Indicator, SessionError, SessionStatus, VoiceOutcome};

use crate::cli::CliArgs;
use crate::commands::{parse_line, Command, HELP};

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

#[cfg(feature = "cpal")]
fn build_microphone(config: &AudioConfig) -> Arc<dyn Microphone> {
    tracing::info!(device = %config.device_name, "Using system microphone");
    Arc::new(parley_audio::CpalMicrophone::new(config.clone()))
}

#[cfg(not(feature = "cpal"))]
fn build_microphone(config: &AudioConfig) -> Arc<dyn Microphone> {
    tracing::warn!(
        device = %config.device_name,
        "Built without the `cpal` feature; voice input uses a simulated microphone"
    );
    Arc::new(parley_audio::MockMicrophone::new())
}

fn print_message(message: &Message) {
    let who = if message.is_user() { "you" } else { "bot" };
    println!("[{}] {}: {}", message.created_at.format("%H:%M:%S"), who, message.text);
}

/// Print new transcript entries and typing changes as the session publishes them.
async fn render_loop(session: ChatSession, mut indicator: watch::Receiver<Indicator>) {
    let mut printed = 0usize;
    let mut was_typing = false;
    loop {
        let shown = *indicator.borrow_and_update();
        let transcript = session.transcript();
        for message in transcript.iter().skip(printed) {
            print_message(message);
        }
        printed = transcript.len();

        if shown.typing && !was_typing {
            println!("  bot is typing...");
        }
        was_typing = shown.typing;

        if indicator.changed().await.is_err() {
            break;
        }
    }
}

fn report_refusal(action: &str, err: &SessionError) {
    if err.is_busy() {
        println!("  ({} ignored: {})", action, err);
    } else {
        tracing::debug!(action, error = %err, "Command refused");
    }
}

async fn toggle_recording(session: &ChatSession) {
    if session.is_recording() {
        match session.stop_voice_capture().await {
            Ok(pipeline) => {
                println!("  recording stopped, transcribing...");
                tokio::spawn(async move {
                    match pipeline.await {
                        Ok(VoiceOutcome::Submitted(_)) => {}
                        Ok(VoiceOutcome::Empty) => println!("  (no speech recognized)"),
                        Ok(VoiceOutcome::Rejected(e)) => {
                            println!("  (transcription kept in draft: {})", e)
                        }
                        Ok(VoiceOutcome::TranscriptionFailed(_)) => {
                            println!("  (transcription failed)")
                        }
                        Err(e) => tracing::error!(error = %e, "Transcription task failed"),
                    }
                });
            }
            Err(e) => println!("  (could not stop recording: {})", e),
        }
    } else {
        match session.start_voice_capture().await {
            Ok(()) => println!("  recording... type /record again to stop"),
            Err(SessionError::Microphone(e)) => {
                tracing::debug!(error = %e, "Voice capture did not start")
            }
            Err(e) => report_refusal("recording", &e),
        }
    }
}

async fn speak(gateway: Arc<dyn InferenceGateway>, text: String, path: &Path) {
    match gateway.text_to_speech(&text).await {
        Ok(audio) => match tokio::fs::write(path, &audio.data).await {
            Ok(()) => println!(
                "  wrote {} bytes of {} to {}",
                audio.len(),
                audio.content_type,
                path.display()
            ),
            Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to write audio"),
        },
        Err(e) => println!("  (speech synthesis failed: {})", e),
    }
}

/// Handle one command. Returns `false` when the prompt should exit.
async fn dispatch(
    command: Command,
    session: &ChatSession,
    gateway: &Arc<dyn InferenceGateway>,
) -> bool {
    match command {
        Command::Submit(text) => {
            let session = session.clone();
            tokio::spawn(async move {
                if let Err(e) = session.submit(&text).await {
                    report_refusal("message", &e);
                }
            });
        }
        Command::SendDraft => {
            let session = session.clone();
            tokio::spawn(async move {
                if let Err(e) = session.submit_draft().await {
                    report_refusal("send", &e);
                }
            });
        }
        Command::Correct(text) => {
            let session = session.clone();
            tokio::spawn(async move {
                let result = match text {
                    Some(text) => session.request_correction(&text).await,
                    None => session.correct_draft().await,
                };
                match result {
                    Ok(Some(_)) => {}
                    Ok(None) => tracing::debug!("Correction produced no message"),
                    Err(e) => report_refusal("correction", &e),
                }
            });
        }
        Command::ToggleRecording => toggle_recording(session).await,
        Command::Emoji(glyph) => {
            session.insert_emoji(&glyph);
            println!("  draft: {}", session.draft());
        }
        Command::Draft(text) => {
            session.set_draft(text);
            println!("  draft: {}", session.draft());
        }
        Command::History => {
            for message in session.transcript() {
                print_message(&message);
            }
        }
        Command::Status => {
            let status = session.status();
            println!(
                "  status: {}{}  draft: {:?}",
                status,
                if session.is_awaiting_response() && status != SessionStatus::AwaitingResponse {
                    " (reply pending)"
                } else {
                    ""
                },
                session.draft()
            );
        }
        Command::Speak { text, path } => {
            let gateway = Arc::clone(gateway);
            tokio::spawn(async move { speak(gateway, text, &path).await });
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    // The API token may come from a .env file in the working directory.
    let dotenv = dotenvy::dotenv();

    // Config. Loaded before tracing so the file can set the log level.
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(ParleyConfig::load(&config_file))
    } else {
        None
    };
    let file_level = match &loaded {
        Some(Ok(config)) => config.general.log_level.clone(),
        _ => ParleyConfig::default().general.log_level,
    };

    // Tracing.
    init_tracing(&args.resolve_log_level(&file_level));
    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let mut config = match loaded {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            tracing::warn!(
                path = %config_file.display(),
                error = %e,
                "Failed to load config. Using defaults."
            );
            ParleyConfig::default()
        }
        None => {
            tracing::info!(path = %config_file.display(), "No config file; using defaults");
            ParleyConfig::default()
        }
    };
    if let Some(model) = args.model.clone() {
        config.gateway.generation_model = model;
    }
    if args.allow_overlap {
        config.session.allow_voice_during_response = true;
    }
    config.validate()?;

    // Gateway and microphone.
    let hugging_face = HuggingFaceGateway::from_config(&config.gateway, &config.generation)?;
    tracing::info!(model = %hugging_face.generation_model(), "Inference gateway ready");
    let gateway: Arc<dyn InferenceGateway> = Arc::new(hugging_face);
    let microphone = build_microphone(&config.audio);

    let session = ChatSession::from_config(Arc::clone(&gateway), microphone, &config.session);
    tokio::spawn(render_loop(session.clone(), session.subscribe()));

    println!("Parley chat. Type /help for commands.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("  {}", e);
                continue;
            }
        };
        if !dispatch(command, &session, &gateway).await {
            break;
        }
    }

    if session.is_recording() {
        // Releases the microphone; the transcription is discarded.
        if let Ok(pipeline) = session.stop_voice_capture().await {
            pipeline.abort();
        }
    }
    tracing::info!(
        session_id = %session.id(),
        messages = session.transcript().len(),
        "Parley exiting"
    );
    Ok(())
}
