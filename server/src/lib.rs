//! # Hangman Session Server Library
//!
//! This library provides the server side of a multiplayer, turn-based word
//! guessing game played over plain TCP. Players join a shared session, take
//! turns guessing letters of a hidden word drawn from a themed vocabulary and
//! receive every state change as a line of text.
//!
//! ## Core Responsibilities
//!
//! ### Single Source of Truth
//! All game state (the roster, the current round and the pending start) lives
//! behind one lock in the [`coordinator`]. Connection handlers only submit
//! intents such as "join", "guess" or "disconnect" and never touch shared
//! collections themselves.
//!
//! ### Ordered Broadcasts
//! Every operation enqueues its outgoing lines while it still holds the lock,
//! so all clients observe updates in the order they were committed. A `TURN`
//! line always follows the update that caused it.
//!
//! ### Round Lifecycle
//! A round starts a few seconds after the second player joins, ends on a
//! solved word or when the attempts run out, and the next one is scheduled
//! automatically. If the roster drops below two players the round is
//! abandoned and the pending start cancelled.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Open connections, the ordered player roster and non-blocking fan-out onto
//! each connection's bounded outbound queue.
//!
//! ### Game Module (`game`)
//! The state machine for one round: secret word, reveal mask, attempts, used
//! letters and the turn pointer.
//!
//! ### Scheduler Module (`scheduler`)
//! Turn advancement and the cancellable delayed start between rounds.
//!
//! ### Coordinator Module (`coordinator`)
//! The serialization point tying registry, round and scheduler together.
//!
//! ### Network Module (`network`)
//! TCP accept loop, per-connection reader and writer tasks and graceful
//! shutdown.
//!
//! ### Vocabulary Module (`vocabulary`)
//! Built-in themed word lists and JSON loading.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{Server, SessionConfig, SessionCoordinator, Vocabulary};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = SessionCoordinator::new(SessionConfig::default(), Vocabulary::builtin());
//!     let server = Server::bind("127.0.0.1:12345", coordinator).await?;
//!
//!     // Serve until Ctrl+C, then close every connection
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod game;
pub mod network;
pub mod registry;
pub mod scheduler;
pub mod vocabulary;

pub use coordinator::{SessionConfig, SessionCoordinator, SessionSnapshot};
pub use error::{ServerError, SessionError};
pub use game::{GameSession, GuessOutcome, SessionStatus};
pub use network::Server;
pub use registry::{ConnectionId, ConnectionRegistry};
pub use scheduler::{StartKind, TurnScheduler};
pub use vocabulary::{Vocabulary, VocabularyError};
