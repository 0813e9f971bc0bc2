// tests/integration/dispatcher_test.rs

use super::test_helpers::{bulk, dispatcher_pair, error, status};
use spineldb_client::ClientError;
use spineldb_client::core::{Command, Response};
use tokio_test::{assert_ok, assert_pending};

#[tokio::test]
async fn test_replies_complete_in_send_order() {
    let (dispatcher, mut server) = dispatcher_pair();

    let first = dispatcher.submit(Command::new("GET").arg("a"));
    let second = dispatcher.submit(Command::new("GET").arg("b"));
    let third = dispatcher.submit(Command::new("INCR").arg("c"));

    server.expect_command(&["GET", "a"]).await;
    server.expect_command(&["GET", "b"]).await;
    server.expect_command(&["INCR", "c"]).await;
    server.reply(bulk("1")).await;
    server.reply(Response::NIL).await;
    server.reply(Response::Integer(7)).await;

    assert_eq!(assert_ok!(first.await), bulk("1"));
    assert_eq!(second.await.unwrap(), Response::NIL);
    assert_eq!(third.await.unwrap(), Response::Integer(7));
}

#[tokio::test]
async fn test_reply_split_across_reads() {
    let (dispatcher, mut server) = dispatcher_pair();

    let mut reply = dispatcher.submit(Command::new("MGET").arg("a").arg("b"));
    server.expect_command(&["MGET", "a", "b"]).await;

    server.reply_raw(b"*2\r\n$5\r\nhel").await;
    tokio::task::yield_now().await;
    assert_pending!(futures::poll!(&mut reply));

    server.reply_chunked(b"lo\r\n$-1\r\n", 1).await;
    assert_eq!(
        reply.await.unwrap(),
        Response::array(vec![bulk("hello"), Response::NIL])
    );
}

#[tokio::test]
async fn test_two_replies_in_one_read() {
    let (dispatcher, mut server) = dispatcher_pair();

    let set = dispatcher.submit(Command::new("SET").arg("k").arg("v"));
    let get = dispatcher.submit(Command::new("GET").arg("k"));
    server.expect_command(&["SET", "k", "v"]).await;
    server.expect_command(&["GET", "k"]).await;
    server.reply_raw(b"+OK\r\n$1\r\nv\r\n").await;

    assert_eq!(set.await.unwrap(), Response::ok());
    assert_eq!(get.await.unwrap(), bulk("v"));
}

#[tokio::test]
async fn test_server_error_is_a_value() {
    let (dispatcher, mut server) = dispatcher_pair();

    let reply = dispatcher.submit(Command::new("INCR").arg("k"));
    server.expect_command(&["INCR", "k"]).await;
    server.reply(error("ERR value is not an integer or out of range")).await;

    let reply = reply.await.unwrap();
    assert!(reply.is_error());
    assert!(!dispatcher.is_closed());
}

#[tokio::test]
async fn test_issue_all_is_one_batch() {
    let (dispatcher, mut server) = dispatcher_pair();

    let script = tokio::spawn(async move {
        server.expect_command(&["SET", "a", "1"]).await;
        server.expect_command(&["SET", "b", "2"]).await;
        server.expect_command(&["MGET", "a", "b"]).await;
        server.reply_raw(b"+OK\r\n+OK\r\n*2\r\n$1\r\n1\r\n$1\r\n2\r\n").await;
        server
    });

    let replies = dispatcher
        .issue_all(vec![
            Command::new("SET").arg("a").arg(1),
            Command::new("SET").arg("b").arg(2),
            Command::new("MGET").arg("a").arg("b"),
        ])
        .await
        .unwrap();
    script.await.unwrap();

    assert_eq!(
        replies,
        vec![
            Response::ok(),
            Response::ok(),
            Response::array(vec![bulk("1"), bulk("2")]),
        ]
    );
}

#[tokio::test]
async fn test_issue_all_empty_sends_nothing() {
    let (dispatcher, mut server) = dispatcher_pair();
    assert_eq!(dispatcher.issue_all(Vec::new()).await.unwrap(), vec![]);
    server.expect_silence().await;
}

#[tokio::test]
async fn test_empty_command_rejected_without_closing() {
    let (dispatcher, mut server) = dispatcher_pair();

    let err = dispatcher.issue(Command::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(!dispatcher.is_closed());

    let reply = dispatcher.submit(Command::new("PING"));
    server.expect_command(&["PING"]).await;
    server.reply(status("PONG")).await;
    assert_eq!(reply.await.unwrap(), status("PONG"));
}

#[tokio::test]
async fn test_abandoned_reply_keeps_order() {
    let (dispatcher, mut server) = dispatcher_pair();

    let abandoned = dispatcher.submit(Command::new("GET").arg("slow"));
    let kept = dispatcher.submit(Command::new("GET").arg("fast"));
    drop(abandoned);

    server.expect_command(&["GET", "slow"]).await;
    server.expect_command(&["GET", "fast"]).await;
    server.reply(bulk("for-slow")).await;
    server.reply(bulk("for-fast")).await;

    assert_eq!(kept.await.unwrap(), bulk("for-fast"));
}

#[tokio::test]
async fn test_eof_fails_every_pending_reply() {
    let (dispatcher, mut server) = dispatcher_pair();

    let first = dispatcher.submit(Command::new("GET").arg("a"));
    let second = dispatcher.submit(Command::new("GET").arg("b"));
    server.expect_command(&["GET", "a"]).await;
    server.expect_command(&["GET", "b"]).await;
    server.hang_up().await;

    assert_eq!(first.await.unwrap_err(), ClientError::ConnectionClosed);
    assert_eq!(second.await.unwrap_err(), ClientError::ConnectionClosed);
    assert!(dispatcher.is_closed());

    // Later submissions fail with the recorded cause.
    let err = dispatcher.issue(Command::new("PING")).await.unwrap_err();
    assert_eq!(err, ClientError::ConnectionClosed);
}

#[tokio::test]
async fn test_malformed_reply_is_a_protocol_failure() {
    let (dispatcher, mut server) = dispatcher_pair();

    let first = dispatcher.submit(Command::new("GET").arg("a"));
    let second = dispatcher.submit(Command::new("GET").arg("b"));
    server.expect_command(&["GET", "a"]).await;
    server.expect_command(&["GET", "b"]).await;
    server.reply_raw(b"!oops\r\n").await;

    let err = first.await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)), "got {err:?}");
    assert_eq!(second.await.unwrap_err(), err);
    assert_eq!(dispatcher.failure(), Some(err));
}

#[tokio::test]
async fn test_unsolicited_reply_closes_connection() {
    let (dispatcher, mut server) = dispatcher_pair();

    server.reply(status("OK")).await;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(dispatcher.is_closed());
    let err = dispatcher.issue(Command::new("PING")).await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[tokio::test]
async fn test_close_fails_unanswered_replies() {
    let (dispatcher, mut server) = dispatcher_pair();

    let reply = dispatcher.submit(Command::new("BLPOP").arg("q").arg(0));
    server.expect_command(&["BLPOP", "q", "0"]).await;
    dispatcher.close().await;

    assert_eq!(reply.await.unwrap_err(), ClientError::ConnectionClosed);
    // The write side was shut down.
    assert_eq!(server.next_command().await, None);
}
