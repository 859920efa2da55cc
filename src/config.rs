//! Process configuration surface, parsed once at startup.

use std::time::Duration;

use clap::Parser;

/// Two-port social-graph fan-out relay.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// TCP bind address for the client (egress) port.
    #[arg(long, default_value = ":9099")]
    pub clients_listen: String,

    /// TCP bind address for the event-source (ingress) port.
    #[arg(long, default_value = ":9090")]
    pub event_source_listen: String,

    /// Reorder ring capacity.
    #[arg(long, default_value_t = 100_000)]
    pub events_capacity: usize,

    /// First expected sequence number.
    #[arg(long, default_value_t = 1)]
    pub start_sequence: u64,

    /// Per-client queue capacity.
    #[arg(long, default_value_t = 10)]
    pub msg_backlog: usize,

    /// Forwarder buffer size in bytes; 0 disables buffering.
    #[arg(long, default_value_t = 4096)]
    pub write_buffer: usize,

    /// Use a single vectored write per flush instead of a byte-copy buffer.
    #[arg(long, default_value_t = false)]
    pub use_writev: bool,

    /// Max forwarder flush latency, in milliseconds; 0 disables the periodic flush.
    #[arg(long = "flush-interval", default_value_t = 10_000)]
    pub flush_interval_ms: u64,

    /// Drop messages to a full client queue instead of blocking the dispatcher.
    #[arg(long, default_value_t = false)]
    pub no_backpressure: bool,

    /// Preserve dispatcher and follow-graph state across source disconnects.
    #[arg(long, default_value_t = false)]
    pub no_reset: bool,

    /// Max delay, in milliseconds, to read a client's user id.
    #[arg(long = "auth-timeout", default_value_t = 1_000)]
    pub auth_timeout_ms: u64,

    /// Source-reader buffered read size, in bytes.
    #[arg(long, default_value_t = 4096)]
    pub read_buffer: usize,
}

impl Config {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn delivery_mode(&self) -> crate::router::DeliveryMode {
        if self.no_backpressure {
            crate::router::DeliveryMode::NoBackpressure
        } else {
            crate::router::DeliveryMode::Backpressure
        }
    }
}
