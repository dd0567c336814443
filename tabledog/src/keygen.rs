//! Distributed 64-bit primary key generator.
//!
//! Layout, most to least significant:
//!
//! `| 1 bit reserved | 41 bits timestamp | 6 bits worker | 9 bits shard | 7 bits sequence |`
//!
//! The timestamp is milliseconds since 2021-06-21 00:00:00 UTC, so the
//! shard index of a row can be recovered from its primary key alone for
//! several decades. Relies on 2 invariants:
//!
//! 1. Workers sharing a database derive distinct worker bits, either from
//!    the `WORKER_ID` environment variable or from the host's IPv4 address.
//! 2. The host clock is reasonably accurate, so `std::time::SystemTime`
//!    returns a good value.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use thiserror::Error;

const TIMESTAMP_SHIFT: u8 = 22;
const WORKER_SHIFT: u8 = 16;
const SHARD_SHIFT: u8 = 7;
const EPOCH_MS: i64 = 1_624_204_800_000; // 2021-06-21 00:00:00 UTC
const MAX_WORKER: i64 = 63;
const SHARD_MASK: i64 = 0x1FF;
const MAX_SEQUENCE: i64 = 127;

static GENERATOR: OnceCell<Generator> = OnceCell::new();

#[derive(Debug, Error)]
pub enum Error {
    #[error("no usable IPv4 address to derive a worker id from")]
    NoAddress,

    #[error("invalid worker id (0..=63 expected): {0}")]
    InvalidWorkerId(String),
}

/// Sequence state. The lock covers both the timestamp comparison and the
/// counter update, and the recorded timestamp is the one callers compose
/// IDs from.
#[derive(Debug, Default)]
struct Sequence {
    last_timestamp_ms: i64,
    counter: i64,
}

impl Sequence {
    fn next(&mut self, now: i64) -> (i64, i64) {
        if now > self.last_timestamp_ms {
            self.last_timestamp_ms = now;
            self.counter = 1;
        } else {
            self.counter += 1;
        }

        (self.last_timestamp_ms, self.counter)
    }
}

/// Process-wide snowflake generator.
#[derive(Debug)]
pub struct Generator {
    worker: i64,
    sequence: Mutex<Sequence>,
}

impl Generator {
    fn with_worker(worker: i64) -> Self {
        Self {
            worker,
            sequence: Mutex::new(Sequence::default()),
        }
    }

    fn from_env() -> Result<Self, Error> {
        let worker = match std::env::var("WORKER_ID") {
            Ok(id) => {
                let worker = id
                    .parse::<i64>()
                    .map_err(|_| Error::InvalidWorkerId(id.clone()))?;
                if !(0..=MAX_WORKER).contains(&worker) {
                    return Err(Error::InvalidWorkerId(id));
                }
                worker
            }

            Err(_) => outbound_ipv4()?.octets()[3] as i64 % (MAX_WORKER + 1),
        };

        Ok(Self::with_worker(worker))
    }

    /// Get (and initialize, if necessary) the process-wide generator.
    ///
    /// Worker identity is resolved once; call this at startup so a missing
    /// address surfaces before any statement needs a key.
    pub fn global() -> Result<&'static Generator, Error> {
        GENERATOR.get_or_try_init(Self::from_env)
    }

    /// Generate the next key with the given shard index embedded.
    ///
    /// Strictly monotonic across all threads of the process. When more
    /// than 127 keys are requested within one millisecond, the call
    /// blocks until the clock advances.
    pub fn next(&self, shard_index: i64) -> i64 {
        let (timestamp, sequence) = loop {
            let now = now_ms();
            let (timestamp, sequence) = self.sequence.lock().next(now);
            if sequence <= MAX_SEQUENCE {
                break (timestamp, sequence);
            }
            std::thread::sleep(Duration::from_micros(100));
        };

        ((timestamp - EPOCH_MS) << TIMESTAMP_SHIFT)
            | (self.worker << WORKER_SHIFT)
            | ((shard_index & SHARD_MASK) << SHARD_SHIFT)
            | sequence
    }
}

/// Shard table index embedded in a generated key.
pub fn shard_index(id: i64) -> i64 {
    (id >> SHARD_SHIFT) & SHARD_MASK
}

/// Worker bits embedded in a generated key.
pub fn worker(id: i64) -> i64 {
    (id >> WORKER_SHIFT) & MAX_WORKER
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("SystemTime is before UNIX_EPOCH")
        .as_millis() as i64
}

/// IPv4 address of the default route interface. Connecting a UDP socket
/// selects a source address without sending a packet.
fn outbound_ipv4() -> Result<std::net::Ipv4Addr, Error> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(|_| Error::NoAddress)?;
    socket
        .connect("8.8.8.8:80")
        .map_err(|_| Error::NoAddress)?;

    match socket.local_addr() {
        Ok(SocketAddr::V4(addr)) if !addr.ip().is_loopback() && !addr.ip().is_unspecified() => {
            Ok(*addr.ip())
        }
        _ => Err(Error::NoAddress),
    }
}
