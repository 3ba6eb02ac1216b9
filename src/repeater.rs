//! Fan-out of the raw inbound byte stream to zero or more TCP endpoints.
//! Ported from `repeater.c`: each endpoint is its own non-blocking
//! connect/write state machine with a bounded, lossy circular buffer —
//! the repeater never backpressures ingestion, it just drops the oldest
//! buffered bytes when an endpoint falls behind.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};

use crate::rdr::MAX_PACKET_SIZE;

const RECONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const FIFO_CAPACITY: usize = MAX_PACKET_SIZE * 2;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Status {
    NotInitialized,
    Connecting,
    Writing,
    Waiting,
}

struct Fifo {
    buf: Vec<u8>,
    iptr: usize,
    optr: usize,
}

impl Fifo {
    fn new() -> Self {
        Fifo { buf: vec![0u8; FIFO_CAPACITY], iptr: 0, optr: 0 }
    }

    fn purge(&mut self) {
        self.iptr = 0;
        self.optr = 0;
    }

    fn is_empty(&self) -> bool {
        self.iptr == self.optr
    }

    /// Append data, compacting or dropping the oldest bytes on overflow.
    /// Mirrors `buffered_write`'s append half, minus the write() call.
    fn append(&mut self, data: &[u8], name: &str) {
        if data.len() > self.buf.len() {
            warn!("RDR Repeater: {} buffer overflow. {} bytes packet skipped", name, data.len());
            return;
        }

        if self.buf.len() - self.iptr < data.len() {
            if self.buf.len() - self.iptr + self.optr >= data.len() {
                self.buf.copy_within(self.optr..self.iptr, 0);
                self.iptr -= self.optr;
                self.optr = 0;
            } else {
                warn!("RDR Repeater: {} buffer overflow. {} bytes skipped", name, self.iptr + 1);
                self.purge();
            }
        }

        self.buf[self.iptr..self.iptr + data.len()].copy_from_slice(data);
        self.iptr += data.len();
    }
}

pub struct Endpoint {
    name: String,
    addrs: Vec<SocketAddr>,
    /// Index of the last candidate address tried. `None` means no
    /// candidate has been tried yet (fresh endpoint, or the previous
    /// sweep exhausted the whole list and wrapped back to the head).
    cur_addr: Option<usize>,
    status: Status,
    stream: Option<TcpStream>,
    waiting_until: Option<Instant>,
    fifo: Fifo,
    token: Token,
}

impl Endpoint {
    fn new(name: String, addrs: Vec<SocketAddr>, token: Token) -> Self {
        Endpoint { name, addrs, cur_addr: None, status: Status::NotInitialized, stream: None, waiting_until: None, fifo: Fifo::new(), token }
    }

    fn display_name(&self) -> String {
        self.cur_addr.and_then(|i| self.addrs.get(i)).map(|a| a.to_string()).unwrap_or_else(|| self.name.clone())
    }

    fn close(&mut self) {
        self.stream = None;
        self.status = Status::NotInitialized;
    }

    /// Attempt to connect, walking forward through the remaining
    /// candidate addresses and stopping at the end of the list -
    /// it does not wrap back to the head within the same call. Mirrors
    /// `try_reopen_socket()`, which advances through `ai_next` to the
    /// end and stops; wraparound to the head only happens on a later
    /// call, once `cur_addr` has been reset to `None` below.
    fn try_reopen(&mut self, registry: &Registry, now: Instant) {
        if self.status == Status::Waiting {
            if let Some(until) = self.waiting_until {
                if now < until {
                    return;
                }
            }
        }

        self.close();
        let mut idx = match self.cur_addr {
            Some(i) => i + 1,
            None => 0,
        };

        while idx < self.addrs.len() {
            self.cur_addr = Some(idx);
            if self.open(registry) {
                return;
            }
            idx += 1;
        }

        self.cur_addr = None;
        self.status = Status::Waiting;
        self.waiting_until = Some(now + RECONNECT_TIMEOUT);
    }

    fn open(&mut self, registry: &Registry) -> bool {
        let addr = match self.cur_addr.and_then(|i| self.addrs.get(i)) {
            Some(a) => *a,
            None => return false,
        };

        debug!("RDR Repeater: trying {}...", addr);
        match TcpStream::connect(addr) {
            Ok(mut stream) => {
                self.status = Status::Connecting;
                if registry.register(&mut stream, self.token, Interest::WRITABLE).is_err() {
                    return false;
                }
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                debug!("RDR Repeater: connect({}) error: {}", addr, e);
                false
            }
        }
    }

    /// Socket became writable while `Connecting`: confirm it actually
    /// connected (mirrors `finish_socket_opening`'s `getpeername` check).
    fn finish_connecting(&mut self, registry: &Registry) -> bool {
        let connected = match &self.stream {
            Some(s) => s.peer_addr().is_ok(),
            None => false,
        };

        if !connected {
            return false;
        }

        if let Some(stream) = &mut self.stream {
            let _ = registry.reregister(stream, self.token, Interest::READABLE);
        }
        self.status = Status::Writing;
        info!("RDR Repeater: connection with {} established successfully", self.display_name());
        true
    }

    fn append(&mut self, data: &[u8]) {
        let name = self.display_name();
        self.fifo.append(data, &name);
    }

    /// Push as much of the FIFO as the socket will currently accept.
    /// Mirrors `buffered_write`'s write half.
    fn pump(&mut self, registry: &Registry, now: Instant) {
        if self.status != Status::Writing {
            return;
        }
        if self.fifo.is_empty() {
            return;
        }

        let stream = match &mut self.stream {
            Some(s) => s,
            None => return,
        };

        match stream.write(&self.fifo.buf[self.fifo.optr..self.fifo.iptr]) {
            Ok(0) => {}
            Ok(n) => {
                self.fifo.optr += n;
                if self.fifo.optr == self.fifo.iptr {
                    self.fifo.purge();
                    let _ = registry.reregister(stream, self.token, Interest::READABLE);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                warn!("RDR Repeater: write() error: {}", e);
                self.try_reopen(registry, now);
            }
        }
    }

    /// React to a readiness event for this endpoint's token.
    fn on_event(&mut self, registry: &Registry, readable: bool, writable: bool, now: Instant) {
        match self.status {
            Status::Connecting => {
                if writable && !self.finish_connecting(registry) {
                    self.try_reopen(registry, now);
                }
            }
            Status::Writing => {
                if readable {
                    // The peer never sends anything back; any read
                    // readiness means EOF or an error on our socket.
                    let mut buf = [0u8; 1];
                    match self.stream.as_mut().map(|s| s.read(&mut buf)) {
                        Some(Ok(0)) => {
                            info!("RDR Repeater: connection {} closed", self.display_name());
                            self.try_reopen(registry, now);
                            return;
                        }
                        Some(Err(e)) if e.kind() != ErrorKind::WouldBlock => {
                            warn!("RDR Repeater: {} read() error: {}", self.display_name(), e);
                            self.try_reopen(registry, now);
                            return;
                        }
                        _ => {}
                    }
                }
                if writable {
                    self.pump(registry, now);
                }
            }
            Status::Waiting | Status::NotInitialized => {}
        }
    }
}

pub struct Repeater {
    endpoints: Vec<Endpoint>,
    next_token: usize,
}

impl Repeater {
    pub fn new() -> Self {
        Repeater { endpoints: Vec::new(), next_token: 1 }
    }

    /// Parse a `host/port` endpoint spec as passed to `-R`, defaulting
    /// the host to `127.0.0.1` and the port to `10001` exactly as
    /// `rdr_repeater_add_endpoint` did, and resolve it immediately.
    pub fn add_endpoint(&mut self, spec: &str) -> Result<(), String> {
        if spec.is_empty() {
            return Err("empty hostname".to_string());
        }

        let (host, port) = match spec.split_once('/') {
            Some((h, p)) if !p.is_empty() => (if h.is_empty() { "127.0.0.1" } else { h }, p),
            Some((h, _)) => (if h.is_empty() { "127.0.0.1" } else { h }, "10001"),
            None => (spec, "10001"),
        };

        let addrs: Vec<SocketAddr> = (host, port.parse::<u16>().map_err(|_| format!("bad port in {}", spec))?)
            .to_socket_addrs()
            .map_err(|e| format!("getaddrinfo({}) error: {}", spec, e))?
            .collect();

        if addrs.is_empty() {
            return Err(format!("No address found for {}", spec));
        }

        let token = Token(self.next_token);
        self.next_token += 1;
        self.endpoints.push(Endpoint::new(format!("{}/{}", host, port), addrs, token));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.iter().map(Endpoint::display_name).collect()
    }

    /// Kick off the initial connection attempt for every endpoint.
    pub fn init_connections(&mut self, registry: &Registry) {
        let now = Instant::now();
        for ep in &mut self.endpoints {
            ep.try_reopen(registry, now);
        }
    }

    pub fn append(&mut self, data: &[u8]) {
        for ep in &mut self.endpoints {
            ep.append(data);
        }
    }

    /// Push pending writes on every `Writing` endpoint; called after a
    /// fresh `append()` as well as from `on_timer`.
    pub fn pump_all(&mut self, registry: &Registry) {
        let now = Instant::now();
        for ep in &mut self.endpoints {
            ep.pump(registry, now);
        }
    }

    /// Periodic tick: retry any endpoint whose backoff has elapsed.
    pub fn on_timer(&mut self, registry: &Registry) {
        let now = Instant::now();
        for ep in &mut self.endpoints {
            if ep.status == Status::Waiting {
                ep.try_reopen(registry, now);
            }
        }
    }

    pub fn handle_event(&mut self, token: Token, readable: bool, writable: bool, registry: &Registry) {
        let now = Instant::now();
        if let Some(ep) = self.endpoints.iter_mut().find(|e| e.token == token) {
            ep.on_event(registry, readable, writable, now);
        }
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.endpoints.iter().map(|e| e.token).collect()
    }
}

impl Default for Repeater {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Poll;

    #[test]
    fn fifo_appends_within_capacity() {
        let mut f = Fifo::new();
        f.append(b"hello", "test");
        assert_eq!(f.iptr, 5);
        assert_eq!(f.optr, 0);
    }

    #[test]
    fn fifo_drops_oversized_packet() {
        let mut f = Fifo::new();
        let huge = vec![0u8; FIFO_CAPACITY + 1];
        f.append(&huge, "test");
        assert_eq!(f.iptr, 0);
    }

    #[test]
    fn fifo_compacts_before_growing_past_tail() {
        let mut f = Fifo::new();
        f.append(&vec![1u8; FIFO_CAPACITY - 10], "test");
        f.optr = FIFO_CAPACITY - 10;
        f.append(&vec![2u8; 20], "test");
        assert_eq!(f.optr, 0);
        assert_eq!(f.iptr, 20);
    }

    #[test]
    fn add_endpoint_defaults_host_and_port() {
        let mut r = Repeater::new();
        r.add_endpoint("/10001").unwrap();
        assert_eq!(r.endpoints[0].name, "127.0.0.1/10001");
    }

    #[test]
    fn add_endpoint_rejects_empty_spec() {
        let mut r = Repeater::new();
        assert!(r.add_endpoint("").is_err());
    }

    #[test]
    fn first_reopen_attempt_tries_head_of_list() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let poll = Poll::new().unwrap();
        let mut ep = Endpoint::new("test".to_string(), vec![addr], Token(1));

        ep.try_reopen(poll.registry(), Instant::now());

        assert_eq!(ep.cur_addr, Some(0));
        assert_eq!(ep.status, Status::Connecting);
    }

    #[test]
    fn exhausting_candidate_list_does_not_wrap_in_same_call() {
        let unreachable: Vec<SocketAddr> = vec!["127.0.0.1:1".parse().unwrap(), "127.0.0.1:2".parse().unwrap()];
        let poll = Poll::new().unwrap();
        let mut ep = Endpoint::new("test".to_string(), unreachable, Token(1));

        ep.try_reopen(poll.registry(), Instant::now());

        assert_eq!(ep.cur_addr, None);
        assert_eq!(ep.status, Status::Waiting);
    }
}
