//! TCP shim: accepts connections, frames newline-terminated requests, and
//! dispatches every stateful command through the dual-execution runtime.
//!
//! One application worker serves one listening port; all closures for that
//! port's connections run on its thread and validate on its paired
//! validator. The loop is non-blocking throughout so a single thread can
//! multiplex its connections.

use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scee::AppThread;

use crate::map::KvStore;
use crate::ops::{checked_del, checked_get, checked_set};
use crate::proto::{parse_request, ret_text, strip_crc_prefix, Request};
use crate::types::RetCode;

const READ_BUFFER_SIZE: usize = 1 << 14;
const MAX_CMD_LEN: usize = 1 << 10;
const IDLE_BACKOFF: Duration = Duration::from_micros(100);

struct Connection {
    stream: TcpStream,
    pending: Vec<u8>,
}

enum Pump {
    Idle,
    Busy,
    Closed,
}

enum Disposition {
    Reply,
    Quit,
}

/// A running server: one worker (and paired validator) per listening port.
pub struct Server {
    stop: Arc<AtomicBool>,
    workers: Vec<AppThread>,
}

impl Server {
    /// Bind `num_ports` consecutive ports starting at `base_port` on all
    /// interfaces, one application worker per port.
    pub fn start(
        store: &'static KvStore,
        base_port: u16,
        num_ports: u16,
    ) -> std::io::Result<Server> {
        let stop = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(num_ports as usize);
        for i in 0..num_ports {
            let port = base_port + i;
            let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))?;
            tracing::info!(port, "server listening");
            let stop = Arc::clone(&stop);
            workers.push(AppThread::spawn(move || serve(listener, store, stop)));
        }
        Ok(Server { stop, workers })
    }

    /// Refuse new work and wait for the workers to drain out.
    pub fn stop(self) {
        self.stop.store(true, Ordering::Release);
        for worker in self.workers {
            worker.join();
        }
    }

    /// Serve until the process dies.
    pub fn join(self) {
        for worker in self.workers {
            worker.join();
        }
    }
}

/// Accept-and-serve loop for one listener. Public so tests can drive a
/// pre-bound listener directly.
pub fn serve(listener: TcpListener, store: &'static KvStore, stop: Arc<AtomicBool>) {
    if let Err(err) = listener.set_nonblocking(true) {
        tracing::error!(error = %err, "failed to make listener non-blocking");
        return;
    }
    let mut conns: Vec<Connection> = Vec::new();
    let mut scratch = vec![0u8; READ_BUFFER_SIZE];

    while !stop.load(Ordering::Acquire) {
        let mut busy = false;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "accepted connection");
                    let _ = stream.set_nonblocking(true);
                    let _ = stream.set_nodelay(true);
                    conns.push(Connection {
                        stream,
                        pending: Vec::new(),
                    });
                    busy = true;
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    break;
                }
            }
        }

        conns.retain_mut(|conn| match pump(conn, store, &mut scratch) {
            Pump::Idle => true,
            Pump::Busy => {
                busy = true;
                true
            }
            Pump::Closed => false,
        });

        if !busy {
            std::thread::sleep(IDLE_BACKOFF);
        }
    }
}

fn pump(conn: &mut Connection, store: &'static KvStore, scratch: &mut [u8]) -> Pump {
    match conn.stream.read(scratch) {
        Ok(0) => Pump::Closed,
        Ok(n) => {
            conn.pending.extend_from_slice(&scratch[..n]);
            let mut out = Vec::new();
            while let Some(pos) = conn.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = conn.pending.drain(..=pos).collect();
                match handle_request(&line, store, &mut out) {
                    Disposition::Reply => {}
                    Disposition::Quit => {
                        let _ = conn.stream.write_all(&out);
                        return Pump::Closed;
                    }
                }
            }
            if conn.pending.len() > MAX_CMD_LEN {
                tracing::warn!("dropping connection: command exceeds {} bytes", MAX_CMD_LEN);
                return Pump::Closed;
            }
            if !out.is_empty() && conn.stream.write_all(&out).is_err() {
                return Pump::Closed;
            }
            Pump::Busy
        }
        Err(err) if err.kind() == ErrorKind::WouldBlock => Pump::Idle,
        Err(_) => Pump::Closed,
    }
}

fn handle_request(line: &[u8], store: &'static KvStore, out: &mut Vec<u8>) -> Disposition {
    let (line, _crc) = strip_crc_prefix(line);
    match parse_request(line) {
        Ok(Request::Quit) => return Disposition::Quit,
        Ok(Request::Set { key, val }) => {
            let code = checked_set(store, key, val);
            out.extend_from_slice(ret_text(code));
        }
        Ok(Request::Get { key }) => {
            let lookup = checked_get(store, key);
            if lookup.found() {
                crate::proto::encode_value_reply(out, &lookup.val);
            } else {
                out.extend_from_slice(ret_text(RetCode::NotFound));
            }
        }
        Ok(Request::Del { key }) => {
            let code = checked_del(store, key);
            out.extend_from_slice(ret_text(code));
        }
        // Malformed requests are answered without logging or validating.
        Err(_) => out.extend_from_slice(ret_text(RetCode::Error)),
    }
    Disposition::Reply
}
