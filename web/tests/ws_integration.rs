use clap::Parser;
use events::{DomainEvent, Id};
use futures::{SinkExt, StreamExt};
use hub::Hub;
use serde_json::{json, Value};
use service::{config::Config, AppState};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(200);

struct TestServer {
    addr: SocketAddr,
    hub: Hub,
    app_state: AppState,
}

async fn spawn_server(args: &[&str]) -> TestServer {
    let mut argv = vec!["skaia_realtime"];
    argv.extend_from_slice(args);
    let config = Config::try_parse_from(argv).unwrap();
    let (hub, publisher) = service::init_hub(&config);
    let app_state = AppState::new(config, hub.clone(), publisher);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = web::router::define_routes(app_state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestServer {
        addr,
        hub,
        app_state,
    }
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    socket
}

async fn wait_for_clients(hub: &Hub, expected: usize) {
    timeout(WAIT, async {
        while hub.snapshot().await.unwrap().connected_clients != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub never reached {expected} connected clients"));
}

async fn next_envelope(socket: &mut Socket) -> Value {
    loop {
        let frame = timeout(WAIT, socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn assert_silent(socket: &mut Socket) {
    if let Ok(Some(Ok(frame))) = timeout(QUIET, socket.next()).await {
        panic!("unexpected extra frame: {frame:?}");
    }
}

#[tokio::test]
async fn three_clients_each_receive_one_copy_of_a_store_update() {
    let server = spawn_server(&[]).await;
    let mut clients = vec![
        connect(server.addr).await,
        connect(server.addr).await,
        connect(server.addr).await,
    ];
    wait_for_clients(&server.hub, 3).await;

    let user = Id::new_v4();
    let sent = json!({
        "type": "store:update",
        "user_id": user.to_string(),
        "payload": {"cart": [{"product_id": "p1", "quantity": 2}]}
    });
    clients[0]
        .send(Message::text(sent.to_string()))
        .await
        .unwrap();

    // Self-delivery is on by default: the sender gets its own copy too.
    for socket in clients.iter_mut() {
        let received = next_envelope(socket).await;
        assert_eq!(received, sent);
        assert_silent(socket).await;
    }
}

#[tokio::test]
async fn sender_is_skipped_when_echo_is_disabled() {
    let server = spawn_server(&["--echo-to-sender", "false"]).await;
    let mut sender = connect(server.addr).await;
    let mut receiver = connect(server.addr).await;
    wait_for_clients(&server.hub, 2).await;

    let sent = json!({"type": "forum:update", "payload": {"threads": [], "posts": []}});
    sender.send(Message::text(sent.to_string())).await.unwrap();

    assert_eq!(next_envelope(&mut receiver).await, sent);
    assert_silent(&mut sender).await;
}

#[tokio::test]
async fn abruptly_closed_client_is_removed_and_others_keep_receiving() {
    let server = spawn_server(&[]).await;
    let doomed = connect(server.addr).await;
    let mut survivor = connect(server.addr).await;
    wait_for_clients(&server.hub, 2).await;

    // Dropping the stream closes the TCP connection without a close frame.
    drop(doomed);
    wait_for_clients(&server.hub, 1).await;

    server
        .hub
        .broadcast(hub::Envelope::new(hub::Kind::ForumSync).with_payload(json!({"threads": []})));
    let received = next_envelope(&mut survivor).await;
    assert_eq!(received["type"], "forum:sync");
}

#[tokio::test]
async fn malformed_frame_disconnects_only_that_client() {
    let server = spawn_server(&[]).await;
    let mut bad = connect(server.addr).await;
    let mut good = connect(server.addr).await;
    wait_for_clients(&server.hub, 2).await;

    bad.send(Message::text("this is not an envelope")).await.unwrap();
    wait_for_clients(&server.hub, 1).await;

    let sent = json!({"type": "user:join", "payload": {}});
    good.send(Message::text(sent.to_string())).await.unwrap();
    assert_eq!(next_envelope(&mut good).await, sent);
}

#[tokio::test]
async fn unknown_kinds_are_relayed_verbatim() {
    let server = spawn_server(&[]).await;
    let mut sender = connect(server.addr).await;
    let mut receiver = connect(server.addr).await;
    wait_for_clients(&server.hub, 2).await;

    let sent = json!({"type": "order:shipped", "payload": {"order_id": 42, "items": [1, 2]}});
    sender.send(Message::text(sent.to_string())).await.unwrap();

    assert_eq!(next_envelope(&mut receiver).await, sent);
}

#[tokio::test]
async fn published_domain_events_reach_websocket_clients() {
    let server = spawn_server(&[]).await;
    let mut socket = connect(server.addr).await;
    wait_for_clients(&server.hub, 1).await;

    let author = Id::new_v4();
    server
        .app_state
        .event_publisher
        .publish(DomainEvent::ForumPostChanged {
            user_id: Some(author),
            post: json!({"id": "p1", "thread_id": "t1", "content": "hi"}),
        })
        .await;

    let received = next_envelope(&mut socket).await;
    assert_eq!(
        received,
        json!({
            "type": "forum:update",
            "user_id": author.to_string(),
            "payload": {"posts": [{"id": "p1", "thread_id": "t1", "content": "hi"}]}
        })
    );
}

#[tokio::test]
async fn stats_and_health_endpoints_report_the_hub() -> anyhow::Result<()> {
    let server = spawn_server(&[]).await;
    let _a = connect(server.addr).await;
    let _b = connect(server.addr).await;
    wait_for_clients(&server.hub, 2).await;

    let http = reqwest::Client::new();
    let health = http
        .get(format!("http://{}/health", server.addr))
        .send()
        .await?;
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await?, "healthy");

    let stats: Value = http
        .get(format!("http://{}/ws/stats", server.addr))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(
        stats,
        json!({"status_code": 200, "data": {"connected_clients": 2}})
    );

    Ok(())
}
