use clap::Parser;
use client::input::{self, InputAction};
use client::network::GameClient;
use client::presentation::ConsolePresentation;
use log::{error, info};
use shared::config::GameConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value = "1234")]
    port: u16,

    /// Pseudonym to request from the server
    #[arg(short = 'n', long)]
    pseudonym: String,

    /// Path to the game constants file
    #[arg(short, long, default_value = "data.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = GameConfig::load(&args.config)?;

    let presentation = Arc::new(ConsolePresentation::new());
    let client =
        GameClient::connect(&args.host, args.port, &args.pseudonym, config, presentation).await?;

    info!("Controls: a/d rotate, w thrust");
    info!("Chat: say <message>, tell <pseudonym> <message>, quit to leave");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !handle_line(&client, line.trim()).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Could not read input: {}", e);
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Reacts to one shell line; returns false when the user wants to leave.
async fn handle_line(client: &GameClient, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    if line == "quit" {
        return false;
    }

    if let Some(action) = InputAction::from_key(line) {
        // Off the shell's loop, like every other input event.
        let registry = Arc::clone(client.registry());
        tokio::spawn(async move {
            input::apply(&registry, action).await;
        });
        return true;
    }

    if let Some(message) = line.strip_prefix("say ") {
        if let Err(e) = client.send_public_chat(message).await {
            error!("Could not send chat message: {}", e);
        }
        return true;
    }

    if let Some(rest) = line.strip_prefix("tell ") {
        match rest.split_once(' ') {
            Some((target, message)) => {
                if let Err(e) = client.send_private_chat(target, message).await {
                    error!("Could not send chat message: {}", e);
                }
            }
            None => eprintln!("Usage: tell <pseudonym> <message>"),
        }
        return true;
    }

    eprintln!("Unknown command: {}", line);
    true
}
