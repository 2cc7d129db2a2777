//! End-to-end tests over real TCP sockets.
//!
//! Clients are plain blocking `std::net` streams speaking the length-prefixed
//! framing from `parley_proto`. The server is ticked by hand so each test
//! controls exactly when a loop iteration happens.

use std::{
    net::{SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use parley_proto::{read_frame, write_frame};
use parley_server::{Server, ServerRuntimeConfig, TickReport};

fn local_server() -> Server {
    let config = ServerRuntimeConfig { bind_address: "127.0.0.1:0".into(), ..Default::default() };
    Server::bind(config).unwrap()
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

fn recv(stream: &mut TcpStream) -> String {
    String::from_utf8(read_frame(stream).unwrap().to_vec()).unwrap()
}

/// Tick until `done` holds for the accumulated report, or give up.
fn tick_until(server: &mut Server, done: impl Fn(&TickReport) -> bool) -> TickReport {
    let mut total = TickReport::default();
    for _ in 0..500 {
        total += server.tick();
        if done(&total) {
            return total;
        }
        thread::sleep(Duration::from_millis(5));
    }
    panic!("server did not reach expected state: {total:?}");
}

#[test]
fn test_join_announces_to_everyone() {
    let mut server = local_server();
    let addr = server.local_addr().unwrap();

    let mut a = connect(addr);
    tick_until(&mut server, |r| r.accepted == 1);
    let mut b = connect(addr);
    tick_until(&mut server, |r| r.accepted == 1);

    assert_eq!(recv(&mut a), "You joined server as guest0");
    assert_eq!(recv(&mut a), "Welcome guest0 to the server!");
    assert_eq!(recv(&mut a), "Welcome guest1 to the server!");

    assert_eq!(recv(&mut b), "You joined server as guest1");
    assert_eq!(recv(&mut b), "Welcome guest1 to the server!");
}

#[test]
fn test_chat_and_commands_round_trip() {
    let mut server = local_server();
    let addr = server.local_addr().unwrap();

    let mut a = connect(addr);
    let mut b = connect(addr);
    tick_until(&mut server, |r| r.accepted == 2);
    for _ in 0..3 {
        recv(&mut a);
    }
    for _ in 0..2 {
        recv(&mut b);
    }

    write_frame(&mut b, b"hello").unwrap();
    tick_until(&mut server, |r| r.messages == 1);
    assert_eq!(recv(&mut a), "guest1 says: hello");
    assert_eq!(recv(&mut b), "guest1 says: hello");

    write_frame(&mut a, b"/setname Alice").unwrap();
    tick_until(&mut server, |r| r.renamed == 1);
    assert_eq!(recv(&mut a), "guest0 changed name to alice");
    assert_eq!(recv(&mut b), "guest0 changed name to alice");

    write_frame(&mut b, b"/list").unwrap();
    tick_until(&mut server, |r| r.messages == 1);
    assert_eq!(recv(&mut b), "guest1\nalice");

    write_frame(&mut b, b"/frobnicate").unwrap();
    tick_until(&mut server, |r| r.messages == 1);
    assert_eq!(recv(&mut b), "This command does not exist");
}

#[test]
fn test_disconnect_releases_name() {
    let mut server = local_server();
    let addr = server.local_addr().unwrap();

    let a = connect(addr);
    let mut b = connect(addr);
    tick_until(&mut server, |r| r.accepted == 2);
    drop(a);
    tick_until(&mut server, |r| r.removed == 1);

    assert_eq!(server.driver().registry().names(), ["guest1"]);

    for _ in 0..2 {
        recv(&mut b);
    }
    write_frame(&mut b, b"/list").unwrap();
    tick_until(&mut server, |r| r.messages == 1);
    assert_eq!(recv(&mut b), "guest1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_until_stops_on_shutdown() {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".into(),
        idle_interval: Duration::from_millis(5),
        ..Default::default()
    };
    let server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let greeting = tokio::task::spawn_blocking(move || {
        let mut client = connect(addr);
        recv(&mut client)
    })
    .await
    .unwrap();
    assert_eq!(greeting, "You joined server as guest0");

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    assert!(result.is_ok());
}
