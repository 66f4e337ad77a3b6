use std::path::PathBuf;

use admin_ipc::{send_request, AdminRequest, DEFAULT_SOCKET_PATH};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use feed_ipc::{publish_all, FeedMessage, DEFAULT_FEED_SOCKET_PATH};
use orders::{FeedError, ShopId};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    socket: String,

    #[arg(long, env = "FEED_SOCKET", default_value = DEFAULT_FEED_SOCKET_PATH)]
    feed_socket: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Status,
    Watch {
        shop_id: String,
    },
    Unwatch,
    Sound {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
    /// Publish feed messages from a file, one JSON message per line.
    Push {
        file: PathBuf,
    },
    /// Publish a feed error for a shop.
    FeedError {
        shop_id: String,
        code: String,
        #[arg(default_value = "")]
        message: String,
    },
}

fn read_messages(raw: &str) -> Result<Vec<FeedMessage>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}", idx + 1))
        })
        .collect()
}

async fn feed(socket: &str, msgs: &[FeedMessage]) -> Result<()> {
    for ack in publish_all(socket, msgs).await? {
        println!("{}", serde_json::to_string(&ack)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let req = match cli.command {
        Command::Status => AdminRequest::Status,
        Command::Watch { shop_id } => AdminRequest::Watch { shop_id },
        Command::Unwatch => AdminRequest::Unwatch,
        Command::Sound { enabled } => AdminRequest::SetSound { enabled },
        Command::Push { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            return feed(&cli.feed_socket, &read_messages(&raw)?).await;
        }
        Command::FeedError {
            shop_id,
            code,
            message,
        } => {
            let msg = FeedMessage::Error {
                shop_id: ShopId::new(shop_id)?,
                error: FeedError::new(code, message),
            };
            return feed(&cli.feed_socket, &[msg]).await;
        }
    };

    let resp = send_request(&cli.socket, &req).await?;
    println!("{}", serde_json::to_string(&resp)?);
    Ok(())
}
