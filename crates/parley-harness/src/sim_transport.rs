//! In-memory transport for deterministic simulation.
//!
//! [`SimNetwork`] is a shared switchboard between the server's [`SimListener`]
//! and any number of [`SimClient`]s. Bytes travel through it framed exactly as
//! they would over TCP (`parley_proto` framing in both directions), but
//! delivery is instant and ordered, so a test decides precisely which messages
//! are visible to which server tick.
//!
//! Faults are injected two ways: explicitly (a client disconnects or has its
//! writes broken) or randomly, with a seeded RNG failing a fraction of server
//! writes. The same seed always fails the same writes.

#![allow(clippy::disallowed_types, reason = "Synchronous locking operations only")]

use std::{
    io,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use bytes::{Bytes, BytesMut};
use parley_proto::{FrameDecoder, encode_frame, payload_text};
use parley_server::{Connection, Listener, TransportError};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Index of a simulated client, in connect order.
pub type ClientId = usize;

/// Both directions of one simulated socket.
#[derive(Debug, Default)]
struct Link {
    /// Framed bytes written by the client, not yet read by the server
    to_server: BytesMut,
    /// Framed bytes written by the server, not yet read by the client
    to_client: BytesMut,
    /// Client hung up; the server sees EOF once it has read everything
    client_closed: bool,
    /// Every further server write fails
    writes_broken: bool,
    /// Server dropped its end
    released: bool,
    /// Server write attempts, including failed ones
    write_attempts: usize,
}

#[derive(Debug)]
struct NetworkState {
    links: Vec<Link>,
    /// Clients waiting to be accepted, in connect order
    backlog: Vec<ClientId>,
    rng: ChaCha8Rng,
    write_failure_rate: f64,
}

/// Shared in-memory network.
///
/// Cloning is cheap and yields a handle to the same network.
#[derive(Debug, Clone)]
pub struct SimNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimNetwork {
    /// Create a network with no random faults.
    pub fn new(seed: u64) -> Self {
        let state = NetworkState {
            links: Vec::new(),
            backlog: Vec::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            write_failure_rate: 0.0,
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Fail each server write with probability `rate` (clamped to `0..=1`).
    ///
    /// A randomly failed write breaks the link for good, like a reset socket.
    pub fn set_write_failure_rate(&self, rate: f64) {
        self.lock().write_failure_rate = rate.clamp(0.0, 1.0);
    }

    /// Listener end of the network, for the server.
    pub fn listener(&self) -> SimListener {
        SimListener { network: self.clone() }
    }

    /// Open a new client connection. It is accepted on the next server tick.
    pub fn connect(&self) -> SimClient {
        let mut state = self.lock();
        let id = state.links.len();
        state.links.push(Link::default());
        state.backlog.push(id);
        SimClient { network: self.clone(), id, decoder: FrameDecoder::new() }
    }

    /// Number of clients that have ever connected.
    pub fn client_count(&self) -> usize {
        self.lock().links.len()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_link<T>(&self, id: ClientId, f: impl FnOnce(&mut Link) -> T) -> Option<T> {
        self.lock().links.get_mut(id).map(f)
    }
}

/// Server end of the network.
#[derive(Debug)]
pub struct SimListener {
    network: SimNetwork,
}

impl Listener for SimListener {
    type Connection = SimConnection;

    fn poll_accept(&mut self) -> Result<Option<SimConnection>, TransportError> {
        let mut state = self.network.lock();
        if state.backlog.is_empty() {
            return Ok(None);
        }
        let id = state.backlog.remove(0);
        drop(state);

        Ok(Some(SimConnection { network: self.network.clone(), id, decoder: FrameDecoder::new() }))
    }
}

/// Server end of one simulated client connection.
#[derive(Debug)]
pub struct SimConnection {
    network: SimNetwork,
    id: ClientId,
    decoder: FrameDecoder,
}

impl SimConnection {
    /// Client on the other end.
    pub fn client_id(&self) -> ClientId {
        self.id
    }
}

impl Connection for SimConnection {
    fn try_read(&mut self) -> Result<Option<Bytes>, TransportError> {
        let (incoming, closed) = self
            .network
            .with_link(self.id, |link| (link.to_server.split(), link.client_closed))
            .ok_or(TransportError::Closed)?;
        self.decoder.extend(&incoming);

        if let Some(payload) = self.decoder.decode()? {
            return Ok(Some(payload));
        }
        if closed {
            self.decoder.finish()?;
            return Err(TransportError::Closed);
        }
        Ok(None)
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let NetworkState { links, rng, write_failure_rate, .. } = &mut *state;
        let link = links.get_mut(self.id).ok_or(TransportError::Closed)?;
        link.write_attempts += 1;

        if link.client_closed {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe).into());
        }
        if !link.writes_broken && *write_failure_rate > 0.0 && rng.gen_bool(*write_failure_rate) {
            tracing::debug!(client = self.id, "injecting write failure");
            link.writes_broken = true;
        }
        if link.writes_broken {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset).into());
        }

        encode_frame(payload, &mut link.to_client)?;
        Ok(())
    }

    fn peer(&self) -> String {
        format!("sim-client-{}", self.id)
    }
}

impl Drop for SimConnection {
    fn drop(&mut self) {
        self.network.with_link(self.id, |link| link.released = true);
    }
}

/// Client end of one simulated connection.
#[derive(Debug)]
pub struct SimClient {
    network: SimNetwork,
    id: ClientId,
    decoder: FrameDecoder,
}

impl SimClient {
    /// Client identifier, in connect order.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Send one text message to the server.
    pub fn send(&self, text: &str) {
        self.network.with_link(self.id, |link| {
            if encode_frame(text.as_bytes(), &mut link.to_server).is_err() {
                tracing::warn!(client = self.id, "message too large to frame, not sent");
            }
        });
    }

    /// Write raw bytes, bypassing framing.
    pub fn send_raw(&self, bytes: &[u8]) {
        self.network.with_link(self.id, |link| link.to_server.extend_from_slice(bytes));
    }

    /// Take every complete message the server has sent so far.
    pub fn take_received(&mut self) -> Vec<String> {
        let incoming =
            self.network.with_link(self.id, |link| link.to_client.split()).unwrap_or_default();
        self.decoder.extend(&incoming);

        let mut received = Vec::new();
        while let Ok(Some(payload)) = self.decoder.decode() {
            received.push(payload_text(&payload));
        }
        received
    }

    /// Make every further server write to this client fail.
    pub fn break_writes(&self) {
        self.network.with_link(self.id, |link| link.writes_broken = true);
    }

    /// Hang up. Messages already sent are still delivered to the server first.
    pub fn disconnect(&self) {
        self.network.with_link(self.id, |link| link.client_closed = true);
    }

    /// Number of writes the server has attempted to this client.
    pub fn write_attempts(&self) -> usize {
        self.network.with_link(self.id, |link| link.write_attempts).unwrap_or_default()
    }

    /// True once the server has dropped its end of the connection.
    pub fn is_released(&self) -> bool {
        self.network.with_link(self.id, |link| link.released).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_follows_connect_order() {
        let network = SimNetwork::new(0);
        let mut listener = network.listener();
        let a = network.connect();
        let b = network.connect();

        assert_eq!(listener.poll_accept().unwrap().unwrap().client_id(), a.id());
        assert_eq!(listener.poll_accept().unwrap().unwrap().client_id(), b.id());
        assert!(listener.poll_accept().unwrap().is_none());
        assert_eq!(network.client_count(), 2);
    }

    #[test]
    fn messages_flow_both_ways() {
        let network = SimNetwork::new(0);
        let mut listener = network.listener();
        let mut client = network.connect();
        let mut conn = listener.poll_accept().unwrap().unwrap();

        assert!(conn.try_read().unwrap().is_none());
        client.send("hi");
        client.send("there");
        assert_eq!(conn.try_read().unwrap(), Some(Bytes::from_static(b"hi")));
        assert_eq!(conn.try_read().unwrap(), Some(Bytes::from_static(b"there")));
        assert!(conn.try_read().unwrap().is_none());

        conn.send(b"welcome").unwrap();
        assert_eq!(client.take_received(), ["welcome"]);
        assert!(client.take_received().is_empty());
        assert_eq!(client.write_attempts(), 1);
    }

    #[test]
    fn disconnect_delivers_pending_then_closes() {
        let network = SimNetwork::new(0);
        let mut listener = network.listener();
        let client = network.connect();
        let mut conn = listener.poll_accept().unwrap().unwrap();

        client.send("last words");
        client.disconnect();

        assert_eq!(conn.try_read().unwrap(), Some(Bytes::from_static(b"last words")));
        assert!(matches!(conn.try_read(), Err(TransportError::Closed)));
        assert!(conn.send(b"too late").is_err());
    }

    #[test]
    fn garbage_length_is_protocol_error() {
        let network = SimNetwork::new(0);
        let mut listener = network.listener();
        let client = network.connect();
        let mut conn = listener.poll_accept().unwrap().unwrap();

        client.send_raw(&u32::MAX.to_be_bytes());
        assert!(matches!(conn.try_read(), Err(TransportError::Protocol(_))));
    }

    #[test]
    fn broken_writes_stay_broken() {
        let network = SimNetwork::new(0);
        let mut listener = network.listener();
        let client = network.connect();
        let mut conn = listener.poll_accept().unwrap().unwrap();

        client.break_writes();
        assert!(conn.send(b"one").is_err());
        assert!(conn.send(b"two").is_err());
        assert_eq!(client.write_attempts(), 2);
    }

    #[test]
    fn dropping_connection_releases_link() {
        let network = SimNetwork::new(0);
        let mut listener = network.listener();
        let client = network.connect();
        let conn = listener.poll_accept().unwrap().unwrap();

        assert!(!client.is_released());
        drop(conn);
        assert!(client.is_released());
    }

    #[test]
    fn random_failures_are_reproducible() {
        fn failures(seed: u64) -> Vec<bool> {
            let network = SimNetwork::new(seed);
            network.set_write_failure_rate(0.5);
            let mut listener = network.listener();
            (0..40)
                .map(|_| {
                    network.connect();
                    let mut conn = listener.poll_accept().unwrap().unwrap();
                    conn.send(b"x").is_err()
                })
                .collect()
        }

        assert_eq!(failures(7), failures(7));
        assert!(failures(7).contains(&true));
    }
}
