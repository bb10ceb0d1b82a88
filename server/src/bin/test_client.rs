use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use shared::{LineCodec, Message};
use std::collections::BTreeSet;
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

/// Letters in rough order of frequency in English text
const GUESS_ORDER: &str = "etaoinshrdlcumwfgypbvkjxqz";

/// Scripted player for smoke-testing a running server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:12345")]
    server: String,

    /// Username to join with
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Leave after this many finished rounds
    #[arg(short, long, default_value_t = 1)]
    rounds: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Connecting to {}", args.server);
    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected from {}", stream.local_addr()?);

    let (reader, writer) = stream.into_split();
    let mut lines = FramedRead::new(reader, LineCodec::new());
    let mut sink = FramedWrite::new(writer, LineCodec::new());

    sink.send(Message::Join {
        username: args.name.clone(),
    })
    .await?;

    let mut tried = BTreeSet::new();
    let mut finished_rounds = 0;

    while let Some(frame) = lines.next().await {
        let message = match frame? {
            Ok(message) => message,
            Err(e) => {
                println!("Unreadable line from server: {}", e);
                continue;
            }
        };
        println!("<- {}", message);

        match message {
            Message::Start { .. } => tried.clear(),
            Message::Correct { letter, .. } | Message::Wrong { letter, .. } => {
                tried.insert(letter);
            }
            Message::Turn { username } if username == args.name => {
                let Some(letter) = GUESS_ORDER.chars().find(|c| !tried.contains(c)) else {
                    println!("Out of letters");
                    break;
                };
                tried.insert(letter);

                let guess = Message::Guess {
                    letter: letter.to_string(),
                };
                println!("-> {}", guess);
                sink.send(guess).await?;
            }
            Message::Win { .. } | Message::Lose { .. } => {
                finished_rounds += 1;
                if finished_rounds >= args.rounds {
                    println!("Played {} rounds, leaving", finished_rounds);
                    break;
                }
            }
            Message::Turn { .. }
            | Message::Joined { .. }
            | Message::Left { .. }
            | Message::Error { .. }
            | Message::Info { .. }
            | Message::Join { .. }
            | Message::Guess { .. } => {}
        }
    }

    println!("Disconnected");
    Ok(())
}
