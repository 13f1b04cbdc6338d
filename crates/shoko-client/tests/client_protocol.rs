//! Client protocol tests against a scripted server.
//!
//! The fake server speaks the frame protocol directly, so these tests can
//! control push ordering and connection loss precisely.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use shoko_client::{CachingClient, ConnectOptions, RpcClient, RpcError, ServerEvent};
use shoko_types::{ClientFrame, Reply, Request, ServerFrame};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Conn = Framed<TcpStream, LengthDelimitedCodec>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn recv_call(conn: &mut Conn) -> (u64, Request) {
    let bytes = conn.next().await.expect("client hung up").unwrap();
    let ClientFrame::Call { id, request } = shoko_types::decode(&bytes).unwrap();
    (id, request)
}

async fn send(conn: &mut Conn, frame: ServerFrame) {
    let bytes = shoko_types::encode(&frame).unwrap();
    conn.send(Bytes::from(bytes)).await.unwrap();
}

/// Accept one connection and answer its lookup.
async fn accept_bound(listener: &TcpListener) -> Conn {
    let (stream, _) = listener.accept().await.unwrap();
    let mut conn = Framed::new(stream, LengthDelimitedCodec::new());
    let (id, request) = recv_call(&mut conn).await;
    assert!(matches!(request, Request::Lookup { .. }));
    send(&mut conn, ServerFrame::Reply { id, reply: Reply::Ack }).await;
    conn
}

#[tokio::test]
async fn test_push_is_handled_before_following_reply() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut conn = accept_bound(&listener).await;
        let (id, _) = recv_call(&mut conn).await; // register
        send(&mut conn, ServerFrame::Reply { id, reply: Reply::Ack }).await;

        let (id, _) = recv_call(&mut conn).await; // read "a"
        send(&mut conn, ServerFrame::Reply { id, reply: Reply::Data(b"old".to_vec()) }).await;

        let (id, _) = recv_call(&mut conn).await; // list
        send(&mut conn, ServerFrame::InvalidateCache { name: "a".into() }).await;
        send(&mut conn, ServerFrame::Reply { id, reply: Reply::Names(vec!["a".into()]) }).await;
        conn
    });

    let client = CachingClient::connect(addr, "tester").await.unwrap();
    assert_eq!(client.read("a").await.unwrap(), b"old");
    assert!(client.cache().contains("a"));

    client.list().await.unwrap();
    // The push preceded the reply on the wire, so it has already been applied.
    assert!(!client.cache().contains("a"));

    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_invalidate_all_clears_cache() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut conn = accept_bound(&listener).await;
        let (id, _) = recv_call(&mut conn).await; // register
        send(&mut conn, ServerFrame::Reply { id, reply: Reply::Ack }).await;

        for _ in 0..2 {
            let (id, request) = recv_call(&mut conn).await;
            let Request::Read { name: Some(name) } = request else {
                panic!("unexpected request {request:?}");
            };
            send(&mut conn, ServerFrame::Reply { id, reply: Reply::Data(name.into_bytes()) }).await;
        }

        let (id, _) = recv_call(&mut conn).await; // list
        send(&mut conn, ServerFrame::InvalidateAll).await;
        send(&mut conn, ServerFrame::Reply { id, reply: Reply::Names(Vec::new()) }).await;
        conn
    });

    let client = CachingClient::connect(addr, "tester").await.unwrap();
    let mut events = client.rpc().subscribe_events();
    client.read("a").await.unwrap();
    client.read("b").await.unwrap();
    assert_eq!(client.cache().len(), 2);

    client.list().await.unwrap();
    assert!(client.cache().is_empty());
    assert_eq!(events.try_recv().unwrap(), ServerEvent::AllInvalidated);

    drop(server.await.unwrap());
}

#[tokio::test]
async fn test_connection_loss_fails_pending_calls_and_clears_cache() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut conn = accept_bound(&listener).await;
        let (id, _) = recv_call(&mut conn).await; // register
        send(&mut conn, ServerFrame::Reply { id, reply: Reply::Ack }).await;
        let (id, _) = recv_call(&mut conn).await; // read "a"
        send(&mut conn, ServerFrame::Reply { id, reply: Reply::Data(b"1".to_vec()) }).await;
        // Swallow the next call and hang up without answering.
        let _ = recv_call(&mut conn).await;
    });

    let client = CachingClient::connect(addr, "tester").await.unwrap();
    let mut events = client.rpc().subscribe_events();
    client.read("a").await.unwrap();
    assert!(client.cache().contains("a"));

    let err = client.list().await.unwrap_err();
    assert!(matches!(err, RpcError::Disconnected), "got {err:?}");

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, ServerEvent::Disconnected);
    assert!(client.cache().is_empty());
    assert!(!client.rpc().is_connected());

    let err = client.rpc().list().await.unwrap_err();
    assert!(matches!(err, RpcError::Disconnected));
}

#[tokio::test]
async fn test_call_timeout() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut conn = accept_bound(&listener).await;
        // Never answer; keep the connection open.
        while conn.next().await.is_some() {}
    });

    let options = ConnectOptions {
        call_timeout: Duration::from_millis(100),
        ..ConnectOptions::default()
    };
    let client = RpcClient::connect_with(addr, options).await.unwrap();
    let err = client.read("a").await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout(_)), "got {err:?}");
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_replies_routed_by_id() {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut conn = accept_bound(&listener).await;
        let mut calls = Vec::new();
        for _ in 0..2 {
            calls.push(recv_call(&mut conn).await);
        }
        // Answer in reverse order.
        for (id, request) in calls.into_iter().rev() {
            let Request::Read { name: Some(name) } = request else {
                panic!("unexpected request {request:?}");
            };
            send(&mut conn, ServerFrame::Reply { id, reply: Reply::Data(name.into_bytes()) }).await;
        }
        while conn.next().await.is_some() {}
    });

    let client = Arc::new(RpcClient::connect(addr).await.unwrap());
    let (a, b) = tokio::join!(client.read("a"), client.read("b"));
    assert_eq!(a.unwrap(), b"a");
    assert_eq!(b.unwrap(), b"b");
}
