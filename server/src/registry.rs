//! Connection tracking and message fan-out for the session server
//!
//! This module keeps the server-side view of every open connection:
//! - Connection lifecycle (attach on accept, join, removal)
//! - The player roster, in join order, which drives turn rotation
//! - Addressed sends and broadcasts onto per-connection outbound queues
//!
//! The registry itself is not synchronized; it lives inside the session
//! coordinator's lock, which is what makes every operation here atomic with
//! respect to the game state.

use crate::error::SessionError;
use log::{info, warn};
use shared::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Server-assigned identifier for one TCP connection
pub type ConnectionId = u32;

/// A connection that has successfully joined the game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: ConnectionId,
    pub username: String,
    pub addr: SocketAddr,
}

/// A player removed from the roster, with the position they held
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub player: Player,
    pub roster_index: usize,
}

/// Represents one open connection and its outbound queue
///
/// Each connection holds:
/// - Connection metadata (ID, peer address)
/// - The username once a `JOIN` has been accepted
/// - The sending half of the queue drained by the connection's writer task
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier assigned by the registry
    pub id: ConnectionId,
    /// Peer address, used for logging
    pub addr: SocketAddr,
    /// Set once the connection has joined as a player
    pub username: Option<String>,
    sender: mpsc::Sender<Message>,
}

impl Connection {
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            addr,
            username: None,
            sender,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.username.is_some()
    }

    /// Queues a message for this connection without waiting
    ///
    /// A full queue means the peer is not reading fast enough to keep up with
    /// the game; it is reported as lost so the caller can drop it instead of
    /// stalling everyone else.
    pub fn send(&self, message: Message) -> Result<(), SessionError> {
        self.sender.try_send(message).map_err(|err| {
            if let TrySendError::Full(_) = err {
                warn!(
                    "Outbound queue for connection {} ({}) is full, dropping peer",
                    self.id, self.addr
                );
            }
            SessionError::ConnectionLost(self.id)
        })
    }
}

/// Tracks every open connection and the ordered player roster
///
/// Connections are attached as soon as they are accepted so the server can
/// answer them, but only joined players are part of the roster and receive
/// broadcasts.
#[derive(Debug)]
pub struct ConnectionRegistry {
    /// Open connections indexed by their ID
    connections: HashMap<ConnectionId, Connection>,
    /// Joined players in join order
    roster: Vec<ConnectionId>,
    /// Next ID handed out by `attach`
    next_connection_id: ConnectionId,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            roster: Vec::new(),
            next_connection_id: 1,
        }
    }

    /// Records a freshly accepted connection
    ///
    /// The connection can be addressed with `send_to` right away but is not
    /// part of the broadcast set until it joins.
    pub fn attach(&mut self, addr: SocketAddr, sender: mpsc::Sender<Message>) -> ConnectionId {
        let id = self.next_connection_id;
        self.next_connection_id += 1;

        info!("Connection {} opened from {}", id, addr);
        self.connections.insert(id, Connection::new(id, addr, sender));
        id
    }

    /// Turns an attached connection into a player at the end of the roster
    pub fn register(&mut self, id: ConnectionId, username: &str) -> Result<Player, SessionError> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(SessionError::UnknownConnection(id))?;

        if let Some(existing) = &connection.username {
            return Err(SessionError::AlreadyJoined(existing.clone()));
        }

        connection.username = Some(username.to_string());
        self.roster.push(id);

        Ok(Player {
            id,
            username: username.to_string(),
            addr: connection.addr,
        })
    }

    /// Removes a connection from the roster and the connection table
    ///
    /// Safe to call more than once. Returns the departed player only if the
    /// connection had joined, which is the caller's cue to announce `LEFT`.
    /// Dropping the connection's queue sender lets its writer task finish.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Departure> {
        let connection = self.connections.remove(&id)?;
        info!("Connection {} ({}) closed", id, connection.addr);

        let username = connection.username?;
        let roster_index = self.roster.iter().position(|entry| *entry == id)?;
        self.roster.remove(roster_index);

        Some(Departure {
            player: Player {
                id,
                username,
                addr: connection.addr,
            },
            roster_index,
        })
    }

    /// Sends a message to one connection
    pub fn send_to(&self, id: ConnectionId, message: Message) -> Result<(), SessionError> {
        self.connections
            .get(&id)
            .ok_or(SessionError::ConnectionLost(id))?
            .send(message)
    }

    /// Sends a message to every joined player
    ///
    /// Delivery to one player never depends on another: each send is a
    /// non-blocking enqueue. Returns the players whose queue rejected the
    /// message so the caller can unregister them.
    pub fn broadcast(&self, message: &Message) -> Vec<ConnectionId> {
        self.roster
            .iter()
            .filter(|id| {
                self.connections
                    .get(*id)
                    .map_or(true, |connection| connection.send(message.clone()).is_err())
            })
            .copied()
            .collect()
    }

    /// Joined players in turn order
    pub fn roster(&self) -> &[ConnectionId] {
        &self.roster
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    pub fn username(&self, id: ConnectionId) -> Option<&str> {
        self.connections
            .get(&id)
            .and_then(|connection| connection.username.as_deref())
    }

    /// Username of the player at a roster position
    pub fn username_at(&self, index: usize) -> Option<&str> {
        self.roster.get(index).and_then(|id| self.username(*id))
    }

    pub fn usernames(&self) -> Vec<String> {
        self.roster
            .iter()
            .filter_map(|id| self.username(*id))
            .map(str::to_string)
            .collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn is_joined(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .is_some_and(Connection::is_joined)
    }

    /// Number of open connections, joined or not
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Drops every connection, closing all outbound queues
    pub fn clear(&mut self) -> usize {
        let count = self.connections.len();
        self.connections.clear();
        self.roster.clear();
        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
