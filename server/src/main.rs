use clap::Parser;
use log::info;
use server::{Server, SessionConfig, SessionCoordinator, Vocabulary};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = 12345)]
    port: u16,

    /// Seconds between the second player joining and the first round
    #[arg(long, default_value_t = 5)]
    start_delay: u64,

    /// Seconds between the end of a round and the next one
    #[arg(long, default_value_t = 5)]
    restart_delay: u64,

    /// JSON file mapping themes to word lists (built-in words if omitted)
    #[arg(long)]
    words: Option<PathBuf>,

    /// Lines queued per connection before a slow client is dropped
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let vocabulary = match &args.words {
        Some(path) => Vocabulary::from_path(path)?,
        None => Vocabulary::builtin(),
    };

    let config = SessionConfig {
        start_delay: Duration::from_secs(args.start_delay),
        restart_delay: Duration::from_secs(args.restart_delay),
        queue_capacity: args.queue_capacity,
        ..SessionConfig::default()
    };
    info!(
        "Starting hangman server with {} themes, {:?} start delay",
        vocabulary.theme_count(),
        config.start_delay
    );

    let addr = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&addr, SessionCoordinator::new(config, vocabulary)).await?;

    println!("Hangman server listening on {}", server.local_addr()?);
    println!("Press Ctrl+C to stop");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    Ok(())
}
