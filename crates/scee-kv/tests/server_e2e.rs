//! End-to-end scenarios over a real TCP connection.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scee::AppThread;
use scee_kv::{serve, KvStore};

struct TestServer {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    worker: Option<AppThread>,
}

fn start_server() -> TestServer {
    let store = KvStore::new(1024).leak();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let stop = Arc::new(AtomicBool::new(false));
    let worker = {
        let stop = Arc::clone(&stop);
        AppThread::spawn(move || serve(listener, store, stop))
    };
    TestServer {
        addr,
        stop,
        worker: Some(worker),
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
    }
}

struct Client {
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        Self {
            reader: BufReader::new(stream),
        }
    }

    fn send(&mut self, bytes: &[u8]) {
        self.reader.get_mut().write_all(bytes).unwrap();
    }

    fn recv_line(&mut self) -> Vec<u8> {
        let mut line = Vec::new();
        self.reader.read_until(b'\n', &mut line).unwrap();
        line
    }

    fn roundtrip(&mut self, request: &[u8]) -> Vec<u8> {
        self.send(request);
        self.recv_line()
    }
}

#[test]
fn set_then_get_returns_the_stored_value() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.roundtrip(b"set abcd 01234567\r\n"), b"CREATED\r\n");
    assert_eq!(client.roundtrip(b"get abcd\r\n"), b"VALUE 01234567\r\n");
}

#[test]
fn overwrite_reports_stored_and_updates() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.roundtrip(b"set abcd 01234567\r\n"), b"CREATED\r\n");
    assert_eq!(client.roundtrip(b"set abcd 11111111\r\n"), b"STORED\r\n");
    assert_eq!(client.roundtrip(b"get abcd\r\n"), b"VALUE 11111111\r\n");
}

#[test]
fn get_on_empty_store_misses() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.roundtrip(b"get zzzz\r\n"), b"NOT_FOUND\r\n");
}

#[test]
fn unknown_verb_errors_and_keeps_the_connection() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.roundtrip(b"xyz\r\n"), b"ERROR\r\n");
    // The connection survives the protocol error.
    assert_eq!(client.roundtrip(b"set abcd 01234567\r\n"), b"CREATED\r\n");
    assert_eq!(client.roundtrip(b"get abcd\r\n"), b"VALUE 01234567\r\n");
}

#[test]
fn checksum_prefix_is_transparent() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.roundtrip(b"15#set abcd 01234567\r\n"), b"CREATED\r\n");
    assert_eq!(client.roundtrip(b"get abcd\r\n"), b"VALUE 01234567\r\n");
}

#[test]
fn delete_removes_the_key() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.roundtrip(b"set abcd 01234567\r\n"), b"CREATED\r\n");
    assert_eq!(client.roundtrip(b"del abcd\r\n"), b"DELETED\r\n");
    assert_eq!(client.roundtrip(b"get abcd\r\n"), b"NOT_FOUND\r\n");
    assert_eq!(client.roundtrip(b"del abcd\r\n"), b"NOT_FOUND\r\n");
}

#[test]
fn quit_closes_the_connection() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    assert_eq!(client.roundtrip(b"set abcd 01234567\r\n"), b"CREATED\r\n");
    client.send(b"quit\n");
    assert_eq!(client.recv_line(), b"");

    // The server keeps accepting new connections.
    let mut other = Client::connect(server.addr);
    assert_eq!(other.roundtrip(b"get abcd\r\n"), b"VALUE 01234567\r\n");
}

#[test]
fn pipelined_requests_answer_in_order() {
    let server = start_server();
    let mut client = Client::connect(server.addr);

    client.send(b"set k001 vvvvvvvv\r\nget k001\r\nget none\r\n");
    assert_eq!(client.recv_line(), b"CREATED\r\n");
    assert_eq!(client.recv_line(), b"VALUE vvvvvvvv\r\n");
    assert_eq!(client.recv_line(), b"NOT_FOUND\r\n");
}

#[test]
fn many_clients_interleave() {
    let server = start_server();

    let handles: Vec<_> = (0..8u8)
        .map(|c| {
            let addr = server.addr;
            std::thread::spawn(move || {
                let mut client = Client::connect(addr);
                for i in 0..50u8 {
                    let key = [b'k', c + b'0', i / 10 + b'0', i % 10 + b'0'];
                    let val = [c + b'a'; 8];
                    let mut set = Vec::new();
                    set.extend_from_slice(b"set ");
                    set.extend_from_slice(&key);
                    set.push(b' ');
                    set.extend_from_slice(&val);
                    set.extend_from_slice(b"\r\n");
                    assert_eq!(client.roundtrip(&set), b"CREATED\r\n");

                    let mut get = Vec::new();
                    get.extend_from_slice(b"get ");
                    get.extend_from_slice(&key);
                    get.extend_from_slice(b"\r\n");
                    let mut expect = Vec::new();
                    expect.extend_from_slice(b"VALUE ");
                    expect.extend_from_slice(&val);
                    expect.extend_from_slice(b"\r\n");
                    assert_eq!(client.roundtrip(&get), expect);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}
