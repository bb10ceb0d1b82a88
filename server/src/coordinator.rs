//! The single place where shared game state changes.
//!
//! Connection handlers and timer tasks never touch the roster or the round
//! directly. Each request locks [`CoordinatorState`], does its bounded amount
//! of work, and enqueues whatever it has to say onto the per-connection
//! outbound queues before releasing the lock. Socket writes happen later in
//! each connection's writer task, so every client sees broadcasts in the
//! order the operations committed.
//!
//! Sends that fail during an operation are collected and settled before the
//! lock is released: the peer is unregistered, `LEFT` is announced and the
//! turn or the round is adjusted as if the player had disconnected.

use crate::error::SessionError;
use crate::game::{parse_guess, GameSession, GuessOutcome, SessionStatus};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::scheduler::{StartKind, TurnScheduler};
use crate::vocabulary::Vocabulary;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{Message, MAX_ATTEMPTS, MIN_PLAYERS, WORD_PLACEHOLDER};
use std::mem;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Tunables for one game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Wait between the roster reaching the minimum and the first round
    pub start_delay: Duration,
    /// Wait between the end of a round and the next one
    pub restart_delay: Duration,
    pub min_players: usize,
    pub max_attempts: u32,
    /// Outbound queue length per connection before the peer counts as lost
    pub queue_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(5),
            restart_delay: Duration::from_secs(5),
            min_players: MIN_PLAYERS,
            max_attempts: MAX_ATTEMPTS,
            queue_capacity: 64,
        }
    }
}

/// Point-in-time view of the session, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub mask: Option<String>,
    pub theme: Option<String>,
    pub attempts_remaining: Option<u32>,
    pub used_letters: Vec<char>,
    pub turn_index: Option<usize>,
    pub current_player: Option<String>,
    pub players: Vec<String>,
    pub start_pending: bool,
}

struct CoordinatorState {
    registry: ConnectionRegistry,
    session: Option<GameSession>,
    scheduler: TurnScheduler,
    vocabulary: Vocabulary,
    rng: StdRng,
    config: SessionConfig,
    /// Peers whose queue rejected a message during the current operation
    lost: Vec<ConnectionId>,
    closed: bool,
    this: Weak<Mutex<CoordinatorState>>,
}

/// Cloneable handle on the shared session state.
#[derive(Clone)]
pub struct SessionCoordinator {
    state: Arc<Mutex<CoordinatorState>>,
}

impl SessionCoordinator {
    pub fn new(config: SessionConfig, vocabulary: Vocabulary) -> Self {
        Self::with_rng(config, vocabulary, StdRng::from_entropy())
    }

    /// Builds a coordinator with a caller-supplied word picker.
    pub fn with_rng(config: SessionConfig, vocabulary: Vocabulary, rng: StdRng) -> Self {
        let state = Arc::new_cyclic(|this| {
            Mutex::new(CoordinatorState {
                registry: ConnectionRegistry::new(),
                session: None,
                scheduler: TurnScheduler::new(config.start_delay, config.restart_delay),
                vocabulary,
                rng,
                config,
                lost: Vec::new(),
                closed: false,
                this: this.clone(),
            })
        });
        Self { state }
    }

    /// Creates an outbound queue for a new connection and attaches it.
    ///
    /// Refused once [`SessionCoordinator::shutdown`] has run.
    pub async fn connect(
        &self,
        addr: SocketAddr,
    ) -> Result<(ConnectionId, mpsc::Receiver<Message>), SessionError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(SessionError::ShuttingDown);
        }
        let (sender, receiver) = mpsc::channel(state.config.queue_capacity.max(1));
        let id = state.registry.attach(addr, sender);
        Ok((id, receiver))
    }

    /// Applies one decoded client message.
    ///
    /// The returned error has already been answered; a fatal one has also
    /// removed the connection, which closes its outbound queue.
    pub async fn handle(&self, id: ConnectionId, message: Message) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let result = match message {
            Message::Join { username } => state.join(id, &username),
            Message::Guess { letter } => state.guess(id, &letter),
            other @ (Message::Start { .. }
            | Message::Turn { .. }
            | Message::Correct { .. }
            | Message::Wrong { .. }
            | Message::Win { .. }
            | Message::Lose { .. }
            | Message::Joined { .. }
            | Message::Left { .. }
            | Message::Error { .. }
            | Message::Info { .. }) => Err(SessionError::ProtocolViolation(format!(
                "{} is a server message",
                other.tag()
            ))),
        };
        state.conclude(id, &result);
        result
    }

    pub async fn join(&self, id: ConnectionId, username: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let result = state.join(id, username);
        state.conclude(id, &result);
        result
    }

    pub async fn guess(&self, id: ConnectionId, letter: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        let result = state.guess(id, letter);
        state.conclude(id, &result);
        result
    }

    /// Removes a connection, announcing `LEFT` if it had joined. Idempotent.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        state.remove(id);
        state.settle();
    }

    /// Timer entry point. Returns whether a round was started.
    pub async fn fire_scheduled_start(&self, generation: u64) -> bool {
        let mut state = self.state.lock().await;
        if state.closed || !state.scheduler.complete(generation) {
            debug!("Ignoring stale scheduled start {}", generation);
            return false;
        }
        let started = state.start_round();
        state.settle();
        started
    }

    /// Cancels the pending start and drops every connection.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        state.scheduler.cancel();
        state.session = None;

        let notice = Message::Info {
            message: "Server shutting down".to_string(),
        };
        state.registry.broadcast(&notice);
        let dropped = state.registry.clear();
        state.lost.clear();
        info!("Session closed, dropped {} connections", dropped);
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.state.lock().await.snapshot()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }
}

impl CoordinatorState {
    fn join(&mut self, id: ConnectionId, raw: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::ShuttingDown);
        }
        if !self.registry.contains(id) {
            return Err(SessionError::UnknownConnection(id));
        }
        if let Some(existing) = self.registry.username(id) {
            return Err(SessionError::AlreadyJoined(existing.to_string()));
        }

        let username = raw.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        if self.registry.usernames().iter().any(|name| name == username) {
            warn!("Username {} is already taken, accepting duplicate", username);
        }

        let player = self.registry.register(id, username)?;
        info!(
            "{} joined from {} ({} players)",
            player.username,
            player.addr,
            self.registry.roster_len()
        );
        self.broadcast(Message::Joined {
            username: player.username,
        });

        let in_progress = self.session.as_ref().is_some_and(GameSession::is_in_progress);
        if in_progress {
            self.catch_up(id);
        } else if self.registry.roster_len() >= self.config.min_players
            && !self.scheduler.is_pending()
        {
            let delay = self.scheduler.delay(StartKind::First);
            self.broadcast(Message::Info {
                message: format!("Round starting in {}", describe_delay(delay)),
            });
            self.schedule_start(StartKind::First);
        }
        Ok(())
    }

    /// Brings a player who joined mid-round up to date.
    fn catch_up(&mut self, id: ConnectionId) {
        let Some(session) = &self.session else {
            return;
        };
        let start = start_message(session);
        let turn = self
            .registry
            .username_at(session.turn_index())
            .map(|username| Message::Turn {
                username: username.to_string(),
            });

        self.send(id, start);
        if let Some(turn) = turn {
            self.send(id, turn);
        }
    }

    fn guess(&mut self, id: ConnectionId, raw: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::ShuttingDown);
        }
        if !self.registry.contains(id) {
            return Err(SessionError::UnknownConnection(id));
        }
        if !self.registry.is_joined(id) {
            return Err(SessionError::ProtocolViolation("GUESS before JOIN".to_string()));
        }

        let letter = parse_guess(raw)?;
        let session = self
            .session
            .as_mut()
            .ok_or(SessionError::NoRoundInProgress)?;
        let outcome = session.guess(self.registry.roster(), id, letter)?;
        debug!("Connection {} guessed '{}': {:?}", id, letter, outcome);

        let ends_round = outcome.ends_round();
        match outcome {
            GuessOutcome::Hit { letter, mask, .. } => {
                self.broadcast(Message::Correct { letter, mask });
            }
            GuessOutcome::Miss {
                letter,
                attempts_left,
                ..
            } => {
                self.broadcast(Message::Wrong {
                    letter,
                    attempts_left,
                });
            }
        }

        if ends_round {
            self.finish_round();
        } else {
            let roster_len = self.registry.roster_len();
            if let Some(session) = self.session.as_mut() {
                self.scheduler.advance(session, roster_len);
            }
            self.announce_turn();
        }
        Ok(())
    }

    fn finish_round(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let word = session.secret_word();
        let theme = session.theme().to_string();
        let message = match session.status() {
            SessionStatus::Won => {
                info!("Round won, the word was {}", word);
                Message::Win { word, theme }
            }
            _ => {
                info!("Round lost, the word was {}", word);
                Message::Lose { word, theme }
            }
        };
        self.broadcast(message);

        let delay = self.scheduler.delay(StartKind::Restart);
        self.broadcast(Message::Info {
            message: format!("Next round in {}", describe_delay(delay)),
        });
        self.schedule_start(StartKind::Restart);
    }

    fn start_round(&mut self) -> bool {
        let session = match GameSession::start(
            self.registry.roster_len(),
            &self.vocabulary,
            &mut self.rng,
            &self.config,
        ) {
            Ok(session) => session,
            Err(error) => {
                info!("Scheduled start skipped: {}", error);
                self.session = None;
                return false;
            }
        };

        let start = start_message(&session);
        self.session = Some(session);
        self.broadcast(start);
        self.announce_turn();
        true
    }

    fn schedule_start(&mut self, kind: StartKind) {
        let this = self.this.clone();
        self.scheduler.schedule(kind, move |generation| async move {
            if let Some(state) = this.upgrade() {
                SessionCoordinator { state }
                    .fire_scheduled_start(generation)
                    .await;
            }
        });
    }

    fn announce_turn(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        if let Some(username) = self.registry.username_at(session.turn_index()) {
            let turn = Message::Turn {
                username: username.to_string(),
            };
            self.broadcast(turn);
        }
    }

    /// Unregisters a connection and repairs the round around its departure.
    fn remove(&mut self, id: ConnectionId) {
        let Some(departure) = self.registry.unregister(id) else {
            return;
        };
        info!(
            "{} left ({} players remain)",
            departure.player.username,
            self.registry.roster_len()
        );
        self.broadcast(Message::Left {
            username: departure.player.username,
        });

        let remaining = self.registry.roster_len();
        if remaining < self.config.min_players {
            let cancelled = self.scheduler.cancel();
            let aborted = self.session.take().is_some();
            if cancelled || aborted {
                info!("Not enough players, session paused");
                self.broadcast(Message::Info {
                    message: "Not enough players, waiting for more to join".to_string(),
                });
            }
            return;
        }

        let turn_moved = self
            .session
            .as_mut()
            .is_some_and(|session| session.player_left(departure.roster_index, remaining));
        if turn_moved {
            self.announce_turn();
        }
    }

    /// Answers a rejected request and queues fatal ones for removal.
    fn conclude(&mut self, id: ConnectionId, result: &Result<(), SessionError>) {
        if let Err(error) = result {
            if error.is_fatal() {
                warn!("Closing connection {}: {}", id, error);
            } else {
                debug!("Rejected request from connection {}: {}", id, error);
            }
            if error.notifies_sender() {
                self.send(
                    id,
                    Message::Error {
                        message: error.to_string(),
                    },
                );
            }
            if error.is_fatal() {
                self.lost.push(id);
            }
        }
        self.settle();
    }

    /// Removes every peer that could not be reached, including peers lost
    /// while announcing earlier removals.
    fn settle(&mut self) {
        while !self.lost.is_empty() {
            for id in mem::take(&mut self.lost) {
                self.remove(id);
            }
        }
    }

    fn broadcast(&mut self, message: Message) {
        let failed = self.registry.broadcast(&message);
        self.lost.extend(failed);
    }

    fn send(&mut self, id: ConnectionId, message: Message) {
        if self.registry.send_to(id, message).is_err() {
            self.lost.push(id);
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.as_ref();
        SessionSnapshot {
            status: session.map_or(SessionStatus::Waiting, GameSession::status),
            mask: session.map(GameSession::mask),
            theme: session.map(|session| session.theme().to_string()),
            attempts_remaining: session.map(GameSession::attempts_remaining),
            used_letters: session
                .map(|session| session.used_letters().iter().copied().collect())
                .unwrap_or_default(),
            turn_index: session.map(GameSession::turn_index),
            current_player: session
                .and_then(|session| self.registry.username_at(session.turn_index()))
                .map(str::to_string),
            players: self.registry.usernames(),
            start_pending: self.scheduler.is_pending(),
        }
    }
}

/// Renders a delay for players: whole seconds as `5s`, anything else in
/// milliseconds.
fn describe_delay(delay: Duration) -> String {
    if delay.subsec_nanos() == 0 {
        format!("{}s", delay.as_secs())
    } else {
        format!("{}ms", delay.as_millis())
    }
}

fn start_message(session: &GameSession) -> Message {
    Message::Start {
        word: WORD_PLACEHOLDER.to_string(),
        mask: session.mask(),
        attempts_left: session.attempts_remaining(),
        theme: session.theme().to_string(),
    }
}
