//! Chaos tests: broadcast delivery under random write failures.
//!
//! The simulated network fails a seeded fraction of server writes. Whatever
//! fails, the server must drop exactly the failing clients, keep serving the
//! rest, and leave the registry consistent after every tick.

use parley_harness::{InvariantRegistry, SimClient, SimServer};

const CLIENTS: usize = 12;
const ROUNDS: usize = 30;

struct Outcome {
    names: Vec<String>,
    released: Vec<bool>,
}

fn run_chaos(seed: u64, failure_rate: f64) -> Outcome {
    let mut server = SimServer::new(seed);
    let invariants = InvariantRegistry::standard();

    let mut clients: Vec<SimClient> = (0..CLIENTS).map(|_| server.join()).collect();
    invariants.assert_all(&server.snapshot(), "after joins");

    server.network().set_write_failure_rate(failure_rate);

    for round in 0..ROUNDS {
        let sender = round % CLIENTS;
        clients[sender].send(&format!("round {round}"));
        server.tick();
        invariants.assert_all(&server.snapshot(), &format!("seed {seed} round {round}"));
    }

    // A survivor never had a write fail, so it saw its own most recent line.
    for client in &mut clients {
        let received = client.take_received();
        if client.is_released() {
            continue;
        }
        let last_own = (0..ROUNDS).rev().find(|r| r % CLIENTS == client.id());
        if let Some(round) = last_own {
            assert!(
                received.iter().any(|m| m.ends_with(&format!("says: round {round}"))),
                "seed {seed}: surviving client {} missed its own line",
                client.id()
            );
        }
    }

    Outcome { names: server.names(), released: clients.iter().map(SimClient::is_released).collect() }
}

#[test]
fn test_random_write_failures_keep_registry_consistent() {
    for seed in 0..20 {
        let outcome = run_chaos(seed, 0.05);
        let survivors = outcome.released.iter().filter(|r| !**r).count();
        assert_eq!(outcome.names.len(), survivors, "seed {seed}");
    }
}

#[test]
fn test_failed_clients_are_released_and_survivors_keep_chatting() {
    let mut server = SimServer::new(99);
    let mut clients: Vec<SimClient> = (0..4).map(|_| server.join()).collect();
    for client in &mut clients {
        client.take_received();
    }

    clients[0].break_writes();
    clients[2].break_writes();
    clients[1].send("ping");
    let report = server.tick();

    assert_eq!(report.removed, 2);
    assert!(clients[0].is_released());
    assert!(clients[2].is_released());
    assert_eq!(server.names(), ["guest1", "guest3"]);

    // Join traffic plus exactly one attempt for the broadcast.
    assert_eq!(clients[0].write_attempts(), 6);
    assert_eq!(clients[2].write_attempts(), 4);

    clients[3].send("pong");
    server.tick();
    assert_eq!(clients[1].take_received(), ["guest1 says: ping", "guest3 says: pong"]);
    assert_eq!(clients[3].take_received(), ["guest1 says: ping", "guest3 says: pong"]);
}

#[test]
fn test_same_seed_same_casualties() {
    let first = run_chaos(1234, 0.1);
    let second = run_chaos(1234, 0.1);

    assert_eq!(first.names, second.names);
    assert_eq!(first.released, second.released);
}

#[test]
fn test_everyone_failing_empties_server() {
    let mut server = SimServer::new(7);
    let clients: Vec<SimClient> = (0..5).map(|_| server.join()).collect();

    server.network().set_write_failure_rate(1.0);
    clients[0].send("hello?");
    let report = server.tick();

    assert_eq!(report.removed, 5);
    assert!(server.names().is_empty());
    assert!(clients.iter().all(SimClient::is_released));
    InvariantRegistry::standard().assert_all(&server.snapshot(), "after total failure");
}
