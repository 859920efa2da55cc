//! Listener loops: event-source ingress and client egress.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::Config;
use crate::event;
use crate::forwarder;
use crate::reorder::ReorderBuffer;
use crate::router::{Queue, Router};

/// Accept one event-source connection at a time; fully drain it (to EOF
/// or error) before accepting the next. A second concurrent source is
/// never served — this is a single-authoritative-source protocol.
pub async fn run_event_source(
    listener: TcpListener,
    router: Arc<Router>,
    config: Arc<Config>,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        eprintln!("event-source: connected {peer}");
        let mut buf = ReorderBuffer::new(config.start_sequence, config.events_capacity);
        read_source_connection(stream, &mut buf, &router, &config).await;
        eprintln!("event-source: disconnected {peer}");
        if !config.no_reset {
            router.reset().await;
            eprintln!("event-source: reset dispatcher and follow graph");
        }
    }
}

async fn read_source_connection(
    stream: TcpStream,
    buf: &mut ReorderBuffer,
    router: &Arc<Router>,
    config: &Config,
) {
    let mut reader = BufReader::with_capacity(config.read_buffer, stream);
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = match reader.read_until(b'\n', &mut line).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                eprintln!("event-source: read error: {e}");
                return;
            }
        };
        let _ = n;

        let ev = match event::parse(&line) {
            Ok(ev) => ev,
            Err(e) => {
                eprintln!("event-source: parse error on {:?}: {e}", String::from_utf8_lossy(&line));
                return;
            }
        };

        let raw = ev.raw.clone();
        match buf.insert(ev) {
            Ok(released) => {
                for released_ev in released {
                    let trigger = released_ev.trigger;
                    let raw = released_ev.raw;
                    trigger.dispatch(raw, router).await;
                }
            }
            Err(e) => {
                eprintln!(
                    "event-source: dispatch error on {:?}: {e}",
                    String::from_utf8_lossy(&raw)
                );
                return;
            }
        }
    }
}

/// Accept client connections and spawn one task per connection.
pub async fn run_client_listener(
    listener: TcpListener,
    router: Arc<Router>,
    config: Arc<Config>,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let router = Arc::clone(&router);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            eprintln!("client: connected {peer}");
            handle_client(stream, router, config).await;
            eprintln!("client: disconnected {peer}");
        });
    }
}

async fn handle_client(stream: TcpStream, router: Arc<Router>, config: Arc<Config>) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut id_line = String::new();
    let read_result = timeout(config.auth_timeout(), reader.read_line(&mut id_line)).await;
    let user_id: i64 = match read_result {
        Ok(Ok(0)) => return,
        Ok(Ok(_)) => match id_line.trim().parse() {
            Ok(id) => id,
            Err(_) => {
                eprintln!("client: bad user id {id_line:?}");
                return;
            }
        },
        Ok(Err(e)) => {
            eprintln!("client: auth read error: {e}");
            return;
        }
        Err(_) => {
            eprintln!("client: auth timeout");
            return;
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(config.msg_backlog);
    let queue = Queue::new(tx);
    let (handle, done_rx) = match router.subscribe(user_id, queue).await {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("client: subscribe error for user {user_id}: {e}");
            return;
        }
    };

    // Ingress half only exists to observe EOF; its content is discarded.
    // On EOF it unsubscribes, which drops every clone of the queue's sender
    // held by the Router and lets `egress` observe its own channel-closed
    // terminal condition and run its flush, rather than being cancelled.
    let mut sink = Vec::new();
    let ingress = async move {
        loop {
            sink.clear();
            match reader.read_until(b'\n', &mut sink).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        handle.unsubscribe().await;
    };

    let egress = forwarder::forward(
        write_half,
        rx,
        done_rx,
        config.write_buffer,
        config.use_writev,
        config.flush_interval(),
    );

    tokio::join!(ingress, egress);
}

/// Run both listener loops to completion. A bind or accept failure on
/// either is fatal and propagates to the caller.
pub async fn run(config: Config) -> std::io::Result<()> {
    let config = Arc::new(config);
    let router = Arc::new(Router::new(config.delivery_mode()));

    let source_listener = TcpListener::bind(normalize_addr(&config.event_source_listen)).await?;
    eprintln!("event-source: listening on {}", config.event_source_listen);
    let client_listener = TcpListener::bind(normalize_addr(&config.clients_listen)).await?;
    eprintln!("client: listening on {}", config.clients_listen);

    let source_task = tokio::spawn(run_event_source(
        source_listener,
        Arc::clone(&router),
        Arc::clone(&config),
    ));
    let client_task = tokio::spawn(run_client_listener(client_listener, router, config));

    tokio::select! {
        res = source_task => res.expect("event-source task panicked")?,
        res = client_task => res.expect("client listener task panicked")?,
    }
    Ok(())
}

/// `Config` mirrors the original flag surface's `:PORT` shorthand; Rust's
/// `TcpListener::bind` needs an explicit host, so an empty host is filled
/// in as `0.0.0.0`.
fn normalize_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}
