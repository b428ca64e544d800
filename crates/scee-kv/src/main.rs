use scee_kv::{KvStore, Server};

const DEFAULT_NUM_SERVERS: u16 = 3;
const DEFAULT_CAPACITY: usize = 1 << 20;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args();
    let prog = args.next().unwrap_or_else(|| "scee-kv".into());
    let Some(port) = args.next().and_then(|a| a.parse::<u16>().ok()) else {
        eprintln!("Usage: {prog} <port> [num_servers]");
        std::process::exit(1);
    };
    let num_servers = match args.next() {
        Some(raw) => match raw.parse::<u16>() {
            Ok(n) if n > 0 => n,
            _ => {
                eprintln!("Usage: {prog} <port> [num_servers]");
                std::process::exit(1);
            }
        },
        None => DEFAULT_NUM_SERVERS,
    };

    let capacity = std::env::var("SCEE_KV_CAPACITY")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(DEFAULT_CAPACITY);

    let store = KvStore::new(capacity).leak();
    scee::main_thread(|| {
        let server = match Server::start(store, port, num_servers) {
            Ok(server) => server,
            Err(err) => {
                eprintln!("failed to start server on port {port}: {err}");
                std::process::exit(1);
            }
        };
        server.join();
    });
}
