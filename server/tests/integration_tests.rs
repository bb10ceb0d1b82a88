//! Integration tests for the hangman session server
//!
//! These tests run a real server on a loopback port and talk to it over TCP
//! the way a client would.

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::{Server, ServerError, SessionConfig, SessionCoordinator, Vocabulary};
use shared::{LineCodec, Message};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::codec::{FramedRead, FramedWrite};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    /// Starts a server whose only word is "bear"
    async fn start() -> Self {
        Self::with_start_delay(Duration::from_millis(50)).await
    }

    async fn with_start_delay(start_delay: Duration) -> Self {
        let mut themes = BTreeMap::new();
        themes.insert("animal".to_string(), vec!["bear".to_string()]);
        let config = SessionConfig {
            start_delay,
            restart_delay: Duration::from_secs(60),
            ..SessionConfig::default()
        };
        let coordinator = SessionCoordinator::with_rng(
            config,
            Vocabulary::new(themes).unwrap(),
            StdRng::seed_from_u64(1),
        );

        let server = Server::bind("127.0.0.1:0", coordinator).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(server.run_until(async {
            let _ = stopped.await;
        }));

        TestServer {
            addr,
            stop: Some(stop),
            handle,
        }
    }

    async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        timeout(RECV_TIMEOUT, self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

struct TestClient {
    lines: FramedRead<OwnedReadHalf, LineCodec>,
    sink: FramedWrite<OwnedWriteHalf, LineCodec>,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        TestClient {
            lines: FramedRead::new(reader, LineCodec::new()),
            sink: FramedWrite::new(writer, LineCodec::new()),
        }
    }

    /// Connects and joins, waiting for the server to confirm
    async fn join(addr: SocketAddr, name: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("JOIN:{}", name)).await;
        client.expect(&format!("JOINED:{}", name)).await;
        client
    }

    async fn send(&mut self, line: &str) {
        self.sink.send(line_message(line)).await.unwrap();
    }

    /// Writes bytes straight to the socket, bypassing the codec
    async fn send_raw(&mut self, bytes: &[u8]) {
        let socket = self.sink.get_mut();
        socket.write_all(bytes).await.unwrap();
        socket.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Message {
        timeout(RECV_TIMEOUT, self.lines.next())
            .await
            .expect("timed out waiting for a line")
            .expect("connection closed")
            .expect("read failed")
            .expect("malformed line from server")
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await, line_message(line));
    }

    async fn expect_silence(&mut self) {
        let next = timeout(Duration::from_millis(150), self.lines.next()).await;
        assert!(next.is_err(), "unexpected line: {:?}", next);
    }

    async fn expect_closed(&mut self) {
        let next = timeout(RECV_TIMEOUT, self.lines.next())
            .await
            .expect("connection stayed open");
        assert!(next.is_none(), "unexpected line: {:?}", next);
    }
}

fn line_message(line: &str) -> Message {
    Message::parse_line(line).unwrap()
}

/// Joins ana then bob and waits for the first round to begin
async fn start_round(addr: SocketAddr) -> (TestClient, TestClient) {
    let mut ana = TestClient::join(addr, "ana").await;
    let mut bob = TestClient::join(addr, "bob").await;

    ana.expect("JOINED:bob").await;
    for client in [&mut ana, &mut bob] {
        client.expect("INFO:Round starting in 50ms").await;
        client.expect("START:?:____:6:animal").await;
        client.expect("TURN:ana").await;
    }
    (ana, bob)
}

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// A line arriving in several TCP segments is handled once complete
    #[tokio::test]
    async fn test_split_line_is_reassembled() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        client.send_raw(b"JO").await;
        sleep(Duration::from_millis(20)).await;
        client.send_raw(b"IN:a").await;
        sleep(Duration::from_millis(20)).await;
        client.send_raw(b"na\n").await;

        client.expect("JOINED:ana").await;
        server.shutdown().await.unwrap();
    }

    /// Several lines in one segment are all processed in order
    #[tokio::test]
    async fn test_several_lines_in_one_write() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        client.send_raw(b"JOIN:  \nJOIN:ana\n").await;
        client.expect("ERROR:username must not be empty").await;
        client.expect("JOINED:ana").await;
        server.shutdown().await.unwrap();
    }

    /// A malformed line is dropped without closing the connection
    #[tokio::test]
    async fn test_malformed_line_keeps_connection() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        client.send_raw(b"HELLO:there\r\n").await;
        client.expect_silence().await;
        client.send("JOIN:ana").await;
        client.expect("JOINED:ana").await;
        server.shutdown().await.unwrap();
    }

    /// Guessing before joining is answered and then the connection is closed
    #[tokio::test]
    async fn test_guess_before_join_closes_connection() {
        let server = TestServer::start().await;
        let mut client = TestClient::connect(server.addr).await;

        client.send("GUESS:a").await;
        client
            .expect("ERROR:protocol violation: GUESS before JOIN")
            .await;
        client.expect_closed().await;
        server.shutdown().await.unwrap();
    }

    /// Server-only tags sent by a client close the connection
    #[tokio::test]
    async fn test_server_tag_from_client_closes_connection() {
        let server = TestServer::with_start_delay(Duration::from_secs(60)).await;
        let mut ana = TestClient::join(server.addr, "ana").await;
        let mut bob = TestClient::join(server.addr, "bob").await;
        ana.expect("JOINED:bob").await;
        ana.expect("INFO:Round starting in 60s").await;
        bob.expect("INFO:Round starting in 60s").await;

        bob.send("TURN:bob").await;
        bob.expect("ERROR:protocol violation: TURN is a server message")
            .await;
        bob.expect_closed().await;

        ana.expect("LEFT:bob").await;
        ana.expect("INFO:Not enough players, waiting for more to join")
            .await;
        server.shutdown().await.unwrap();
    }
}

/// GAME SESSION TESTS
mod session_tests {
    use super::*;

    /// Two players play a full round to a win
    #[tokio::test]
    async fn test_full_round() {
        let server = TestServer::start().await;
        let (mut ana, mut bob) = start_round(server.addr).await;

        ana.send("GUESS:z").await;
        for client in [&mut ana, &mut bob] {
            client.expect("WRONG:z:5").await;
            client.expect("TURN:bob").await;
        }

        // The repeat is answered to bob only and bob keeps the turn
        bob.send("GUESS:z").await;
        bob.expect("ERROR:letter 'z' was already guessed").await;
        ana.expect_silence().await;

        let moves = [
            ("b", "CORRECT:b:b___", "TURN:ana"),
            ("e", "CORRECT:e:be__", "TURN:bob"),
            ("a", "CORRECT:a:bea_", "TURN:ana"),
        ];
        for (n, (letter, update, turn)) in moves.into_iter().enumerate() {
            let guesser = if n % 2 == 0 { &mut bob } else { &mut ana };
            guesser.send(&format!("GUESS:{}", letter)).await;
            ana.expect(update).await;
            ana.expect(turn).await;
            bob.expect(update).await;
            bob.expect(turn).await;
        }

        ana.send("GUESS:R").await;
        for client in [&mut ana, &mut bob] {
            client.expect("CORRECT:r:bear").await;
            client.expect("WIN:bear:animal").await;
            client.expect("INFO:Next round in 60s").await;
        }
        server.shutdown().await.unwrap();
    }

    /// Guessing out of turn changes nothing for anyone else
    #[tokio::test]
    async fn test_out_of_turn_guess() {
        let server = TestServer::start().await;
        let (mut ana, mut bob) = start_round(server.addr).await;

        bob.send("GUESS:b").await;
        bob.expect("ERROR:it is not your turn").await;
        ana.expect_silence().await;

        ana.send("GUESS:b").await;
        ana.expect("CORRECT:b:b___").await;
        server.shutdown().await.unwrap();
    }

    /// A player dropping mid-round pauses the session
    #[tokio::test]
    async fn test_disconnect_mid_round() {
        let server = TestServer::start().await;
        let (mut ana, bob) = start_round(server.addr).await;

        drop(bob);
        ana.expect("LEFT:bob").await;
        ana.expect("INFO:Not enough players, waiting for more to join")
            .await;

        ana.send("GUESS:b").await;
        ana.expect("ERROR:no round in progress").await;
        server.shutdown().await.unwrap();
    }

    /// A player joining mid-round gets the current state privately
    #[tokio::test]
    async fn test_late_joiner() {
        let server = TestServer::start().await;
        let (mut ana, mut bob) = start_round(server.addr).await;

        ana.send("GUESS:e").await;
        ana.expect("CORRECT:e:_e__").await;
        bob.expect("CORRECT:e:_e__").await;

        let mut cid = TestClient::connect(server.addr).await;
        cid.send("JOIN:cid").await;
        cid.expect("JOINED:cid").await;
        cid.expect("START:?:_e__:6:animal").await;
        cid.expect("TURN:bob").await;

        ana.expect("TURN:bob").await;
        ana.expect("JOINED:cid").await;
        ana.expect_silence().await;
        server.shutdown().await.unwrap();
    }
}

/// SERVER LIFECYCLE TESTS
mod server_tests {
    use super::*;

    /// Binding an address in use is reported as a bind error
    #[tokio::test]
    async fn test_bind_conflict() {
        let server = TestServer::start().await;
        let coordinator = SessionCoordinator::new(SessionConfig::default(), Vocabulary::builtin());

        let result = Server::bind(&server.addr.to_string(), coordinator).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
        server.shutdown().await.unwrap();
    }

    /// Shutdown tells every client and closes their connections
    #[tokio::test]
    async fn test_shutdown_closes_clients() {
        let server = TestServer::start().await;
        let mut ana = TestClient::join(server.addr, "ana").await;
        let mut lurker = TestClient::connect(server.addr).await;
        // Make sure the lurker's connection has been accepted
        lurker.send("JOIN:").await;
        lurker.expect("ERROR:username must not be empty").await;

        server.shutdown().await.unwrap();

        ana.expect("INFO:Server shutting down").await;
        ana.expect_closed().await;
        lurker.expect_closed().await;
    }
}
