use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colloquy_client::{CpalBackend, SessionConfig, SessionController, SessionUpdate};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod prompt;

#[derive(Debug, Parser)]
#[command(name = "colloquy", about = "Voice client for live conversational sessions")]
struct Args {
    /// Live session endpoint.
    #[arg(long, default_value = "ws://localhost:8080/api/live-session")]
    url: String,

    /// API key for the remote service.
    #[arg(long, env = "COLLOQUY_API_KEY")]
    api_key: String,

    /// Voice preset for synthesized replies.
    #[arg(long, default_value = "Zephyr")]
    voice: String,

    /// File holding facilitator instructions. Defaults to the built-in
    /// study script.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Emit updates as JSON lines instead of formatted text.
    #[arg(long)]
    json: bool,
}

fn render(update: &SessionUpdate, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(update) {
            println!("{line}");
        }
        return;
    }
    match update {
        SessionUpdate::Status(status) => println!("[{status}]"),
        SessionUpdate::Entry(entry) => println!("{}: {}", entry.speaker, entry.text),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let system_prompt = match &args.prompt_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading prompt file {}", path.display()))?,
        None => prompt::FACILITATOR_INSTRUCTIONS.to_string(),
    };

    let config = SessionConfig {
        url: args.url.clone(),
        api_key: args.api_key.clone(),
        voice: args.voice.clone(),
        system_prompt,
    };
    let mut controller = SessionController::new(CpalBackend::new(), config);

    info!(url = %args.url, "starting live session");
    controller.start_session().await?;
    if !args.json {
        println!("Session started. Speak into the microphone; Ctrl-C ends the session.");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                controller.end_session();
            }
            update = controller.next_update() => {
                match update {
                    Some(update) => render(&update, args.json),
                    None => break,
                }
            }
        }
    }

    // The transcript survives teardown so the session can be reviewed.
    if !args.json && !controller.transcript().is_empty() {
        println!();
        println!("Transcript:");
        for entry in controller.transcript() {
            println!("  {}: {}", entry.speaker, entry.text);
        }
    }

    Ok(())
}
