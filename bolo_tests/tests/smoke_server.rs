//! Smoke tests that speak the wire protocol by hand against a bare server.

use bolo_server::{Incoming, Server, ServerState};
use bolo_shared::{
    command::Command,
    math::Transform,
    net::{read_message, write_message, Message, MAX_FRAME_BYTES, PROTOCOL_VERSION},
    world::World,
};
use bolo_tests::{init_tracing, pump_until, test_config};
use tokio::net::TcpStream;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hello_is_answered_with_connected_to_server() -> anyhow::Result<()> {
    init_tracing();
    let mut server = Server::bind("127.0.0.1:0", "Host", &test_config()).await?;

    let mut stream = TcpStream::connect(server.local_addr()).await?;
    write_message(&mut stream, &Message::hello("Raw"), MAX_FRAME_BYTES).await?;
    let answer = read_message(&mut stream, MAX_FRAME_BYTES).await?;
    assert_eq!(
        answer,
        Some(Message::Command(Command::ConnectedToServer {
            client_name: "Raw".into(),
            server_name: "Host".into(),
        }))
    );

    let mut joined = false;
    pump_until("the join event", || {
        joined |= server
            .poll()
            .iter()
            .any(|e| matches!(e, Incoming::Joined { index: 0, name } if name == "Raw"));
        Ok(joined)
    })
    .await?;
    assert_eq!(server.client_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wrong_protocol_version_is_rejected() -> anyhow::Result<()> {
    init_tracing();
    let mut server = Server::bind("127.0.0.1:0", "Host", &test_config()).await?;

    let mut stream = TcpStream::connect(server.local_addr()).await?;
    let hello = Message::Hello {
        protocol: PROTOCOL_VERSION + 1,
        player_name: "Time traveller".into(),
    };
    write_message(&mut stream, &hello, MAX_FRAME_BYTES).await?;

    match read_message(&mut stream, MAX_FRAME_BYTES).await? {
        Some(Message::Rejected { reason }) => assert!(reason.contains("protocol"), "{reason}"),
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(server.poll().is_empty());
    assert_eq!(server.roster().len(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_peer_does_not_get_an_index() -> anyhow::Result<()> {
    init_tracing();
    let mut cfg = test_config();
    cfg.handshake_timeout_ms = 100;
    let mut server = Server::bind("127.0.0.1:0", "Host", &cfg).await?;

    // Connects but never says Hello.
    let _silent = TcpStream::connect(server.local_addr()).await?;
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let mut stream = TcpStream::connect(server.local_addr()).await?;
    write_message(&mut stream, &Message::hello("Prompt"), MAX_FRAME_BYTES).await?;
    assert!(matches!(
        read_message(&mut stream, MAX_FRAME_BYTES).await?,
        Some(Message::Command(Command::ConnectedToServer { .. }))
    ));

    pump_until("Prompt to take index 0", || {
        server.poll();
        Ok(server.roster().name(0) == Some("Prompt"))
    })
    .await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_game_fails_once_the_only_client_has_dropped() -> anyhow::Result<()> {
    init_tracing();
    let mut server = Server::bind("127.0.0.1:0", "Host", &test_config()).await?;

    let mut stream = TcpStream::connect(server.local_addr()).await?;
    write_message(&mut stream, &Message::hello("Flaky"), MAX_FRAME_BYTES).await?;
    read_message(&mut stream, MAX_FRAME_BYTES).await?;
    pump_until("Flaky to join", || {
        server.poll();
        Ok(server.roster().name(0) == Some("Flaky"))
    })
    .await?;

    drop(stream);
    pump_until("the reader to notice", || {
        Ok(server.roster().get(0).map(|c| c.is_alive()) == Some(false))
    })
    .await?;

    // No poll in between: the dead slot is not yet a tombstone.
    assert_eq!(server.client_count(), 0);
    let err = server
        .start_game(&World::new(4, 4), &[Transform::ZERO], 3)
        .expect_err("no live clients");
    assert!(err.is_illegal_state());
    assert_eq!(server.state(), ServerState::Lobby);

    let left = server.poll();
    assert!(left.contains(&Incoming::Left {
        index: 0,
        name: "Flaky".into()
    }));
    Ok(())
}
