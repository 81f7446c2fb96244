//! Client sessions against a real server
//!
//! Interactive sessions read from and write to in-memory pipes; the other
//! participants use the client API directly.

use std::{net::SocketAddr, time::Duration};

use bytes::Bytes;
use parley_client::{ChatClient, MonitorClient, NicknameOutcome};
use parley_proto::{ClientRequest, ErrorCode, MonitorMessage, ServerReply};
use parley_server::{Server, ServerRuntimeConfig};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines},
    net::TcpListener,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server() -> (SocketAddr, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = Server::from_listener(listener, ServerRuntimeConfig::default());
    let addr = server.local_addr().unwrap();
    let token = CancellationToken::new();
    tokio::spawn(server.run(token.clone()));
    (addr, token)
}

/// Interactive session wired to pipes.
struct Terminal {
    keyboard: DuplexStream,
    screen: Lines<BufReader<DuplexStream>>,
    session: JoinHandle<Result<(), parley_client::ClientError>>,
    shutdown: CancellationToken,
}

impl Terminal {
    async fn chat(addr: SocketAddr, nickname: Option<&str>) -> Self {
        let client = ChatClient::connect(&addr.to_string()).await.unwrap();

        let (keyboard, input) = tokio::io::duplex(4096);
        let (output, screen) = tokio::io::duplex(4096);
        let shutdown = CancellationToken::new();

        let session = tokio::spawn(client.run(
            BufReader::new(input),
            output,
            nickname.map(str::to_string),
            shutdown.clone(),
        ));

        Self { keyboard, screen: BufReader::new(screen).lines(), session, shutdown }
    }

    async fn type_line(&mut self, line: &str) {
        self.keyboard.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }

    async fn screen_line(&mut self) -> String {
        tokio::time::timeout(TIMEOUT, self.screen.next_line())
            .await
            .expect("timed out waiting for output")
            .unwrap()
            .expect("screen closed")
    }

    async fn finish(self) {
        tokio::time::timeout(TIMEOUT, self.session)
            .await
            .expect("session did not end")
            .unwrap()
            .unwrap();
    }
}

async fn member(addr: SocketAddr, nickname: &str) -> ChatClient {
    let mut client = ChatClient::connect(&addr.to_string()).await.unwrap();
    assert_eq!(
        client.claim_nickname(nickname).await.unwrap(),
        NicknameOutcome::Accepted(nickname.to_string())
    );
    client
}

async fn reply(client: &mut ChatClient) -> ServerReply {
    tokio::time::timeout(TIMEOUT, client.next_reply())
        .await
        .expect("timed out waiting for reply")
        .unwrap()
        .expect("server closed")
}

#[tokio::test]
async fn interactive_chat_session() {
    let (addr, server) = start_server().await;

    let mut alice = Terminal::chat(addr, None).await;
    alice.type_line("alice").await;
    assert_eq!(alice.screen_line().await, "Enter chat nickname: Joined as alice");

    let mut bob = ChatClient::connect(&addr.to_string()).await.unwrap();
    match bob.claim_nickname("alice").await.unwrap() {
        NicknameOutcome::Rejected(error) => assert_eq!(error.code, ErrorCode::NicknameTaken),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_eq!(
        bob.claim_nickname("bob").await.unwrap(),
        NicknameOutcome::Accepted("bob".to_string())
    );
    assert_eq!(alice.screen_line().await, "* bob joined");

    alice.type_line("hello").await;
    assert_eq!(reply(&mut bob).await, ServerReply::Message {
        sender: "alice".to_string(),
        text: Bytes::from_static(b"hello"),
    });

    alice.type_line("/bob psst").await;
    assert_eq!(reply(&mut bob).await, ServerReply::DirectMessage {
        sender: "alice".to_string(),
        text: Bytes::from_static(b"psst"),
    });

    bob.send(ClientRequest::SendMessage(Bytes::from_static(b"hey"))).await.unwrap();
    assert_eq!(alice.screen_line().await, "bob said: hey");

    alice.type_line("LIST").await;
    assert_eq!(alice.screen_line().await, "Members: alice, bob");

    alice.type_line("/carol anyone?").await;
    assert_eq!(alice.screen_line().await, "Error: no member named carol");

    alice.type_line("quit").await;
    alice.finish().await;
    assert_eq!(reply(&mut bob).await, ServerReply::MemberLeft("alice".to_string()));

    server.cancel();
}

#[tokio::test]
async fn rejected_nickname_prompts_again() {
    let (addr, server) = start_server().await;
    let _bob = member(addr, "bob").await;

    let mut alice = Terminal::chat(addr, Some("bob")).await;
    assert_eq!(alice.screen_line().await, "nickname bob is already taken");

    alice.type_line("has space").await;
    assert!(alice.screen_line().await.starts_with("Enter chat nickname: "));

    alice.type_line("alice").await;
    assert_eq!(alice.screen_line().await, "Enter chat nickname: Joined as alice");

    alice.shutdown.cancel();
    alice.finish().await;

    server.cancel();
}

#[tokio::test]
async fn ctrl_c_disconnects_cleanly() {
    let (addr, server) = start_server().await;
    let mut bob = member(addr, "bob").await;

    let mut alice = Terminal::chat(addr, Some("alice")).await;
    assert_eq!(alice.screen_line().await, "Joined as alice");
    assert_eq!(reply(&mut bob).await, ServerReply::MemberJoined("alice".to_string()));

    alice.shutdown.cancel();
    alice.finish().await;

    assert_eq!(reply(&mut bob).await, ServerReply::MemberLeft("alice".to_string()));

    server.cancel();
}

#[tokio::test]
async fn server_shutdown_ends_session() {
    let (addr, server) = start_server().await;

    let mut alice = Terminal::chat(addr, Some("alice")).await;
    assert_eq!(alice.screen_line().await, "Joined as alice");

    server.cancel();

    assert_eq!(alice.screen_line().await, "Error: server is shutting down");
    assert_eq!(alice.screen_line().await, "Server closed the connection");
    alice.finish().await;
}

#[tokio::test]
async fn filtered_monitor_feed() {
    let (addr, server) = start_server().await;

    let mut monitor = MonitorClient::connect(&addr.to_string(), Some("bob".to_string()))
        .await
        .unwrap();
    // Monitors get no acknowledgement
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut alice = member(addr, "alice").await;
    let mut bob = member(addr, "bob").await;
    assert_eq!(reply(&mut alice).await, ServerReply::MemberJoined("bob".to_string()));

    alice.send(ClientRequest::SendMessage(Bytes::from_static(b"not for bob"))).await.unwrap();
    alice
        .send(ClientRequest::SendDirectMessage {
            recipient: Bytes::from_static(b"bob"),
            text: Bytes::from_static(b"for bob"),
        })
        .await
        .unwrap();
    assert!(matches!(reply(&mut bob).await, ServerReply::Message { .. }));
    assert!(matches!(reply(&mut bob).await, ServerReply::DirectMessage { .. }));

    let next = tokio::time::timeout(TIMEOUT, monitor.next_message()).await.unwrap().unwrap();
    assert_eq!(next, Some(MonitorMessage::DirectMessage {
        sender: "alice".to_string(),
        text: Bytes::from_static(b"for bob"),
    }));

    server.cancel();
}
