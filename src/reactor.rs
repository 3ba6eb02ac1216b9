//! Single-threaded, non-blocking event loop tying the listener, the
//! per-session RDR ingest/NetFlow pipeline, and the repeater together.
//! Built on `mio::Poll` as the one readiness primitive, the direct
//! analogue of the original's single `select()` call over every fd.

use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Registry, Token};

use crate::ipfilter::IpFilter;
use crate::repeater::Repeater;
use crate::session::Session;

const LISTENER_TOKEN: Token = Token(0);
const SESSION_TOKEN_BASE: usize = 1_000_000;
const IDLE_TIMEOUT: Duration = Duration::from_secs(3);

struct Connection {
    stream: mio::net::TcpStream,
    session: Session,
}

pub struct Reactor {
    poll: Poll,
    listener: TcpListener,
    collector: UdpSocket,
    connections: HashMap<Token, Connection>,
    next_session_token: usize,
    repeater: Repeater,
    ip_filter: IpFilter,
    quit: Arc<AtomicBool>,
}

impl Reactor {
    pub fn new(src: SocketAddrV4, dst: SocketAddrV4, repeater: Repeater, ip_filter: IpFilter) -> std::io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(src.into())?;
        poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let collector = UdpSocket::bind("0.0.0.0:0")?;
        collector.connect(dst)?;

        info!("Listening on {}", src);
        info!("Sending NetFlow to {}", dst);

        Ok(Reactor {
            poll,
            listener,
            collector,
            connections: HashMap::new(),
            next_session_token: SESSION_TOKEN_BASE,
            repeater,
            ip_filter,
            quit: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Install SIGINT/SIGTERM handling that just flips the quit flag,
    /// the Rust-ecosystem equivalent of `signal(SIGINT, sig_quit)`.
    pub fn install_signal_handler(&self) -> Result<(), String> {
        let quit = self.quit.clone();
        ctrlc::set_handler(move || quit.store(true, Ordering::SeqCst)).map_err(|e| e.to_string())
    }

    pub fn start_repeater(&mut self) {
        if !self.repeater.is_empty() {
            info!("Repeat all incoming TCP packets to hosts: {}", self.repeater.endpoint_names().join(", "));
        }
        self.repeater.init_connections(self.poll.registry());
    }

    pub fn run(&mut self) -> std::io::Result<()> {
        let mut events = Events::with_capacity(128);

        while !self.quit.load(Ordering::SeqCst) {
            match self.poll.poll(&mut events, Some(IDLE_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            if self.quit.load(Ordering::SeqCst) {
                break;
            }

            if events.is_empty() {
                flush_all_sessions(&mut self.connections, &self.collector);
                self.repeater.on_timer(self.poll.registry());
                continue;
            }

            let mut to_remove = Vec::new();
            for event in &events {
                let token = event.token();
                if token == LISTENER_TOKEN {
                    accept_all(&self.poll.registry(), &mut self.listener, &mut self.connections, &mut self.next_session_token);
                } else if token.0 >= SESSION_TOKEN_BASE {
                    let registry = self.poll.registry();
                    if let Some(conn) = self.connections.get_mut(&token) {
                        let remove = read_session(conn, &mut self.repeater, &self.ip_filter, &self.collector, registry);
                        if remove {
                            to_remove.push(token);
                        }
                    }
                } else {
                    self.repeater.handle_event(token, event.is_readable(), event.is_writable(), self.poll.registry());
                }
            }

            for token in to_remove {
                if let Some(mut conn) = self.connections.remove(&token) {
                    let _ = self.poll.registry().deregister(&mut conn.stream);
                    flush_session(&mut conn.session, &self.collector);
                    info!("Closed connection {}", conn.session.remote_addr);
                }
            }
        }

        flush_all_sessions(&mut self.connections, &self.collector);
        info!("Closing App");
        Ok(())
    }
}

fn accept_all(registry: &Registry, listener: &mut TcpListener, connections: &mut HashMap<Token, Connection>, next_token: &mut usize) {
    loop {
        match listener.accept() {
            Ok((mut stream, addr)) => {
                let token = Token(*next_token);
                *next_token += 1;

                if let Err(e) = registry.register(&mut stream, token, Interest::READABLE) {
                    warn!("register() error: {}", e);
                    continue;
                }

                info!("Accepted connection from {}", addr);
                connections.insert(token, Connection { stream, session: Session::new(addr) });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("accept() error: {}", e);
                break;
            }
        }
    }
}

/// Drain the socket into the session buffer, teeing every chunk to the
/// repeater as it arrives (mirrors `read_data`'s `rdr_repeater_append`
/// call happening before `convert_rcvd_data`). Returns whether the
/// session should be torn down.
fn read_session(conn: &mut Connection, repeater: &mut Repeater, ip_filter: &IpFilter, collector: &UdpSocket, registry: &Registry) -> bool {
    loop {
        if conn.session.is_buffer_full() {
            conn.session.ingest(ip_filter);
            if conn.session.is_buffer_full() {
                // The safety valve inside ingest() already dropped or
                // compacted what it could; nothing more to free here.
                break;
            }
        }

        let pos_before = conn.session.pos();
        match conn.stream.read(conn.session.spare_capacity()) {
            Ok(0) => return true,
            Ok(n) => {
                conn.session.advance(n);
                repeater.append(conn.session.written_since(pos_before));
                repeater.pump_all(registry);
                if conn.session.ingest(ip_filter) {
                    flush_session(&mut conn.session, collector);
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("read() error: {}", e);
                return true;
            }
        }
    }
    false
}

fn flush_session(session: &mut Session, collector: &UdpSocket) {
    if let Some(dgram) = session.netflow.flush() {
        if let Err(e) = collector.send(&dgram) {
            warn!("send() error: {}", e);
        }
    }
}

fn flush_all_sessions(connections: &mut HashMap<Token, Connection>, collector: &UdpSocket) {
    for conn in connections.values_mut() {
        flush_session(&mut conn.session, collector);
    }
}
