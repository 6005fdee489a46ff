use bytes::Bytes;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use mailgate::config::GatewayConfig;
use mailgate::protocol::{decode_event, encode_command, Command, ConnectionKind, ErrorCode, Event};
use mailgate::server::{self, AppState, ErrorBody, Health, AUTH_HEADER, JSON_LINES};
use mailgate::session::{SessionId, SessionPhase, SessionSnapshot};
use mailgate::smtp::mock::{MockBehavior, MockTransportFactory};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(factory: MockTransportFactory, auth_key: Option<&str>) -> SocketAddr {
    let mut config = GatewayConfig::default();
    config.server.auth_key = auth_key.map(String::from);
    config.stream.heartbeat_interval_secs = 0;

    let app = server::router(AppState::new(&config, Arc::new(factory)));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

type BodySender = mpsc::UnboundedSender<Result<Vec<u8>, std::io::Error>>;

fn streaming_body() -> (BodySender, reqwest::Body) {
    let (tx, rx) = mpsc::unbounded();
    (tx, reqwest::Body::wrap_stream(rx))
}

fn write_command(body: &BodySender, command: &Command) {
    body.unbounded_send(Ok(encode_command(command).unwrap())).unwrap();
}

type EventBody = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

struct EventReader {
    lines: FramedRead<StreamReader<EventBody, Bytes>, LinesCodec>,
}

impl EventReader {
    fn new(response: reqwest::Response) -> Self {
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| io::Error::new(io::ErrorKind::Other, e)));
        let body: EventBody = Box::pin(body);
        Self {
            lines: FramedRead::new(StreamReader::new(body), LinesCodec::new_with_max_length(1024 * 1024)),
        }
    }

    async fn next(&mut self) -> Option<Event> {
        let line = timeout(WAIT, self.lines.next()).await.expect("timed out waiting for event")?;
        Some(decode_event(line.unwrap().as_bytes()).unwrap())
    }

    async fn expect_state(&mut self, expected: ConnectionKind) -> SessionId {
        match self.next().await {
            Some(Event::ConnectionStateChanged { id, state }) if state == expected => id,
            other => panic!("Expected {:?} state event, got {:?}", expected, other),
        }
    }
}

async fn wait_for_no_sessions(client: &reqwest::Client, addr: SocketAddr) {
    for _ in 0..50 {
        let health: Health = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if health.sessions == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Sessions were not released");
}

#[tokio::test]
async fn test_health() {
    let addr = spawn_server(MockTransportFactory::new(), Some("secret")).await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    let health: Health = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.sessions, 0);
}

#[tokio::test]
async fn test_auth_key_is_enforced() {
    let addr = spawn_server(MockTransportFactory::new(), Some("secret")).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/smtp/stream?host=smtp.example.com&port=587", addr);

    let response = client.post(&url).send().await.unwrap();
    assert_eq!(response.status(), 401);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.code, ErrorCode::Unauthorized);

    let response = client.post(&url).header(AUTH_HEADER, "wrong").send().await.unwrap();
    assert_eq!(response.status(), 401);

    let response = client
        .get(format!("http://{}/smtp/sessions/{}", addr, SessionId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = client.post(&url).header(AUTH_HEADER, "secret").send().await.unwrap();
    assert_eq!(response.status(), 200);
    let mut events = EventReader::new(response);
    events.expect_state(ConnectionKind::Open).await;
}

#[tokio::test]
async fn test_invalid_stream_parameters() {
    let addr = spawn_server(MockTransportFactory::new(), None).await;
    let client = reqwest::Client::new();

    for query in ["host=smtp.example.com&port=0", "port=587", "host=&port=587", "host=smtp.example.com"] {
        let response = client
            .post(format!("http://{}/smtp/stream?{}", addr, query))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query: {}", query);
    }

    let response = client
        .post(format!("http://{}/smtp/stream?smtpHost=smtp.example.com&smtpHostPort=587", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_connect_failure_is_bad_gateway() {
    let addr = spawn_server(MockTransportFactory::with_behavior(MockBehavior::failing_connect()), None).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/smtp/stream?host=smtp.example.com&port=587", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body: ErrorBody = response.json().await.unwrap();
    assert_eq!(body.code, ErrorCode::TransportError);
}

#[tokio::test]
async fn test_imap_stream_is_unavailable() {
    let addr = spawn_server(MockTransportFactory::new(), None).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/imap/stream", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn test_session_lookup() {
    let addr = spawn_server(MockTransportFactory::new(), None).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/smtp/sessions/{}", addr, SessionId::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(format!("http://{}/smtp/sessions/not-a-session", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_stream_round_trip() {
    let addr = spawn_server(MockTransportFactory::new(), None).await;
    let client = reqwest::Client::new();
    let (body, request_body) = streaming_body();

    let response = client
        .post(format!("http://{}/smtp/stream?host=smtp.example.com&port=587", addr))
        .header("content-type", JSON_LINES)
        .body(request_body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], JSON_LINES);

    let mut events = EventReader::new(response);
    let open_id = events.expect_state(ConnectionKind::Open).await;

    let snapshot: SessionSnapshot = client
        .get(format!("http://{}/smtp/sessions/{}", addr, open_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot.id, open_id);
    assert_eq!(snapshot.status, SessionPhase::Connected);
    assert!(!snapshot.is_logged_in);

    write_command(&body, &Command::login("alice@example.com", "hunter2"));
    let inuse_id = events.expect_state(ConnectionKind::InUse).await;

    let response = client
        .get(format!("http://{}/smtp/sessions/{}", addr, open_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let snapshot: SessionSnapshot = client
        .get(format!("http://{}/smtp/sessions/{}", addr, inuse_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot.status, SessionPhase::Authenticated);
    assert_eq!(snapshot.last_command_succeeded, Some(true));

    // Garbage is reported in-band and the stream carries on
    body.unbounded_send(Ok(b"{not json}\n".to_vec())).unwrap();
    match events.next().await {
        Some(Event::Error { code, id, .. }) => {
            assert_eq!(code, ErrorCode::DecodeError);
            assert_eq!(id, Some(inuse_id));
        }
        other => panic!("Expected decode error, got {:?}", other),
    }

    drop(body);
    assert_eq!(events.next().await, None);
    wait_for_no_sessions(&client, addr).await;
}

#[tokio::test]
async fn test_dropped_response_releases_session() {
    let factory = MockTransportFactory::new();
    let addr = spawn_server(factory.clone(), None).await;
    let client = reqwest::Client::new();
    let (body, request_body) = streaming_body();

    let response = client
        .post(format!("http://{}/smtp/stream?host=smtp.example.com&port=587", addr))
        .body(request_body)
        .send()
        .await
        .unwrap();
    let mut events = EventReader::new(response);
    events.expect_state(ConnectionKind::Open).await;

    drop(events);
    drop(body);
    wait_for_no_sessions(&client, addr).await;

    // The entry is removed before the transport finishes closing
    for _ in 0..50 {
        if factory.open_connections() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Transport was not closed");
}
