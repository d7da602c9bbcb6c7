use anyhow::{Context, Result};
use clap::Parser;
use pairchat_lib::peer::Status;
use pairchat_lib::{ClientConfig, Command, Origin, UiEvent};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "pairchat")]
#[command(about = "Random video chat with a stranger")]
struct Cli {
    #[arg(long, value_name = "PATH", help = "TOML config file")]
    config: Option<PathBuf>,
    #[arg(long, env = "PAIRCHAT_URL", value_name = "URL", help = "Override signaling endpoint")]
    url: Option<String>,
    #[arg(long, help = "Look for a new partner when a connection fails")]
    auto_advance: bool,
}

const HELP: &str = "commands: /start /next /stop /quit, anything else is sent as chat";

#[tokio::main]
async fn main() -> Result<()> {
    pairchat_lib::logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(url) = cli.url {
        config.signaling_url = url;
    }
    if cli.auto_advance {
        config.auto_advance_on_failure = true;
    }

    let mut client = pairchat_lib::run(config).context("failed to start client")?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let command = match line.trim() {
                    "/quit" => break,
                    "/start" => Command::Start,
                    "/next" => Command::Next,
                    "/stop" => Command::Stop,
                    "/help" => {
                        println!("{HELP}");
                        continue;
                    }
                    "" => continue,
                    text => Command::SendChat(text.to_string()),
                };
                client.send(command)?;
            }
            event = client.events.recv() => match event {
                Some(event) => print_event(event),
                None => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

fn print_event(event: UiEvent) {
    match event {
        UiEvent::Status { status, message } => {
            let marker = match status {
                Status::Connected => "+",
                Status::Failed | Status::Disconnected => "!",
                _ => "*",
            };
            println!("[{marker}] {message}");
        }
        UiEvent::ChatAppended(msg) => {
            let who = match msg.origin {
                Origin::Me => "you",
                Origin::Peer => "stranger",
            };
            println!("{} {who}: {}", msg.at.format("%H:%M"), msg.text);
        }
        UiEvent::ChatCleared => println!("--- chat cleared ---"),
        UiEvent::RemoteStream(Some(stream)) => {
            println!("[video] stranger's stream {} ({} tracks)", stream.stream_id, stream.tracks.len())
        }
        UiEvent::RemoteStream(None) => println!("[video] stranger's stream closed"),
        UiEvent::LocalPreview(media) => println!("[video] camera on ({})", media.stream_id()),
        UiEvent::Error(message) => eprintln!("error: {message}"),
    }
}
