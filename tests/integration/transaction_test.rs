// tests/integration/transaction_test.rs

//! `MULTI`/`EXEC` driven end to end against the mock server.

use super::test_helpers::{bulk, client_pair, error, serve, status};
use spineldb_client::ClientError;
use spineldb_client::core::commands::{BitOperation, SetOptions};
use spineldb_client::core::{Command, Response};
use std::time::Duration;

#[tokio::test]
async fn test_commit_returns_exec_reply() {
    let (mut client, server) = client_pair();
    let script = serve(
        server,
        vec![
            (vec!["MULTI"], Response::ok()),
            (vec!["SET", "k", "v"], status("QUEUED")),
            (vec!["INCRBY", "n", "5"], status("QUEUED")),
            (vec!["GET", "k"], status("QUEUED")),
            (
                vec!["EXEC"],
                Response::array(vec![Response::ok(), Response::Integer(5), bulk("v")]),
            ),
        ],
    );

    let mut tx = client.begin_transaction();
    tx.set("k", "v").incr_by("n", 5).get("k");
    assert_eq!(tx.len(), 3);
    let reply = tx.commit().await.unwrap();

    let mut server = script.await.unwrap();
    server.expect_silence().await;
    assert_eq!(
        reply,
        Response::array(vec![Response::ok(), Response::Integer(5), bulk("v")])
    );
}

#[tokio::test]
async fn test_queueing_failure_discards_and_never_execs() {
    let (mut client, server) = client_pair();
    let script = serve(
        server,
        vec![
            (vec!["MULTI"], Response::ok()),
            (vec!["INCR", "k"], status("QUEUED")),
            (vec!["GET", "k"], error("ERR wrong type")),
            (vec!["DISCARD"], Response::ok()),
        ],
    );

    let mut tx = client.begin_transaction();
    tx.queue(Command::new("INCR").arg("k"))
        .queue(Command::new("GET").arg("k"))
        .queue(Command::new("SET").arg("never").arg("sent"));
    let reply = tx.commit().await.unwrap();

    assert_eq!(reply, error("ERR wrong type"));
    let mut server = script.await.unwrap();
    server.expect_silence().await;
}

#[tokio::test]
async fn test_non_queued_status_counts_as_failure() {
    let (mut client, server) = client_pair();
    let script = serve(
        server,
        vec![
            (vec!["MULTI"], Response::ok()),
            (vec!["SET", "k", "v"], Response::ok()),
            (vec!["DISCARD"], Response::ok()),
        ],
    );

    let mut tx = client.begin_transaction();
    tx.set("k", "v");
    assert_eq!(tx.commit().await.unwrap(), Response::ok());
    script.await.unwrap().expect_silence().await;
}

#[tokio::test]
async fn test_empty_transaction_still_round_trips() {
    let (mut client, server) = client_pair();
    let script = serve(
        server,
        vec![
            (vec!["MULTI"], Response::ok()),
            (vec!["EXEC"], Response::array(vec![])),
        ],
    );

    let reply = client.begin_transaction().commit().await.unwrap();
    assert_eq!(reply, Response::Array(Some(vec![])));
    script.await.unwrap();
}

#[tokio::test]
async fn test_watch_abort_yields_nil_array() {
    let (mut client, server) = client_pair();
    let script = serve(
        server,
        vec![
            (vec!["WATCH", "balance"], Response::ok()),
            (vec!["MULTI"], Response::ok()),
            (vec!["DECRBY", "balance", "10"], status("QUEUED")),
            (vec!["EXEC"], Response::Array(None)),
        ],
    );

    assert!(client.watch(["balance"]).await.unwrap().is_ok());
    let mut tx = client.begin_transaction();
    tx.decr_by("balance", 10);
    let reply = tx.commit().await.unwrap();

    assert!(reply.is_nil());
    assert_eq!(reply, Response::Array(None));
    script.await.unwrap();
}

#[tokio::test]
async fn test_refused_multi_is_returned_without_discard() {
    let (mut client, server) = client_pair();
    let script = serve(
        server,
        vec![(
            vec!["MULTI"],
            error("ERR MULTI calls can not be nested"),
        )],
    );

    let mut tx = client.begin_transaction();
    tx.get("k");
    let reply = tx.commit().await.unwrap();

    assert_eq!(reply, error("ERR MULTI calls can not be nested"));
    script.await.unwrap().expect_silence().await;
}

#[tokio::test]
async fn test_connection_loss_during_commit_is_an_error() {
    let (mut client, mut server) = client_pair();
    let script = tokio::spawn(async move {
        server.expect_command(&["MULTI"]).await;
        server.reply(Response::ok()).await;
        server.expect_command(&["GET", "k"]).await;
        server.hang_up().await;
    });

    let mut tx = client.begin_transaction();
    tx.get("k").get("other");
    let err = tx.commit().await.unwrap_err();
    script.await.unwrap();

    assert_eq!(err, ClientError::ConnectionClosed);
    assert!(client.is_closed());
}

#[tokio::test]
async fn test_empty_queued_command_fails_before_multi() {
    let (mut client, mut server) = client_pair();

    let mut tx = client.begin_transaction();
    tx.set("a", "1").queue(Command::default()).set("b", "2");
    let err = tx.commit().await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)), "got {err:?}");
    server.expect_silence().await;

    assert!(!client.is_closed());
    let script = serve(server, vec![(vec!["GET", "a"], Response::NIL)]);
    assert_eq!(client.issue(Command::new("GET").arg("a")).await.unwrap(), Response::NIL);
    script.await.unwrap().expect_silence().await;
}

#[tokio::test]
async fn test_abandoned_commit_discards_the_transaction() {
    let (mut client, mut server) = client_pair();
    let script = tokio::spawn(async move {
        server.expect_command(&["MULTI"]).await;
        server.reply(Response::ok()).await;
        server.expect_command(&["SET", "a", "1"]).await;
        // The acknowledgement is held back until the client gives up.
        server.expect_command(&["DISCARD"]).await;
        server.reply(status("QUEUED")).await;
        server.reply(Response::ok()).await;
        server.expect_command(&["PING"]).await;
        server.reply(status("PONG")).await;
        server
    });

    let mut tx = client.begin_transaction();
    tx.set("a", "1").set("b", "2");
    let outcome = tokio::time::timeout(Duration::from_millis(100), tx.commit()).await;
    assert!(outcome.is_err(), "commit should still be waiting for QUEUED");

    assert_eq!(client.ping().await.unwrap(), status("PONG"));
    script.await.unwrap().expect_silence().await;
}

#[tokio::test]
async fn test_dropped_transaction_sends_nothing() {
    let (mut client, mut server) = client_pair();
    {
        let mut tx = client.begin_transaction();
        tx.set("k", "v").del(["a", "b"]);
    }
    server.expect_silence().await;

    let reply = client.submit("PING");
    server.expect_command(&["PING"]).await;
    server.reply(status("PONG")).await;
    assert_eq!(reply.await.unwrap(), status("PONG"));
}

#[tokio::test]
async fn test_typed_helpers_queue_wire_commands() {
    let (mut client, server) = client_pair();
    let script = serve(
        server,
        vec![
            (vec!["MULTI"], Response::ok()),
            (vec!["SET", "s", "1", "NX", "PX", "1500"], status("QUEUED")),
            (vec!["MSETNX", "a", "1", "b", "2"], status("QUEUED")),
            (vec!["BITOP", "XOR", "dest", "x", "y"], status("QUEUED")),
            (vec!["BITPOS", "bits", "0", "2"], status("QUEUED")),
            (vec!["SETBIT", "bits", "7", "1"], status("QUEUED")),
            (vec!["INCRBYFLOAT", "f", "0.5"], status("QUEUED")),
            (vec!["SELECT", "3"], status("QUEUED")),
            (
                vec!["EXEC"],
                Response::array(vec![
                    Response::ok(),
                    Response::Integer(1),
                    Response::Integer(1),
                    Response::Integer(-1),
                    Response::Integer(0),
                    bulk("0.5"),
                    Response::ok(),
                ]),
            ),
        ],
    );

    let mut tx = client.begin_transaction();
    tx.set_with(
        "s",
        1,
        SetOptions::default()
            .if_not_exists()
            .expires_in(Duration::from_millis(1500)),
    )
    .mset([("a", 1), ("b", 2)], true)
    .bitop(BitOperation::Xor, "dest", ["x", "y"])
    .bitpos_range("bits", false, 2, None)
    .setbit("bits", 7, true)
    .incr_by_float("f", 0.5)
    .select(3);

    let reply = tx.commit().await.unwrap();
    assert_eq!(reply.into_array().map(|items| items.len()), Some(7));
    script.await.unwrap();
}
