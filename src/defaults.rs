//! The engine's tunable constants, gathered in one place as the teacher's
//! `defaults.rs` did for its own timeouts and retry counts.

use std::time::Duration;

/// Read-idle deadline before a self-PING, then disconnect (spec §4.1, §5).
pub const PING_TIMEOUT: Duration = Duration::from_secs(60);

/// How long `wait_for` waits for a matching line (spec §5).
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(20);

/// Post-registration throttle: this many lines per [`THROTTLE_TIME`] (spec §4.1).
pub const THROTTLE_RATE: u32 = 4;
pub const THROTTLE_TIME: Duration = Duration::from_secs(2);

/// Pre-registration throttle rate: effectively unthrottled (spec §4.4).
pub const PRE_REGISTRATION_RATE: u32 = 100;
pub const PRE_REGISTRATION_PERIOD: Duration = Duration::from_secs(1);

/// Default `ConnectionParams::reconnect_seconds`.
pub const RECONNECT_SECONDS: u64 = 10;

/// How long `connect()` waits for the transport to come up (spec §7 `connect-timeout`).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Supervisor reconnect backoff: doubles on each failure up to this cap (spec §6).
pub const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// `AUTHENTICATE` payloads are chunked into pieces this large (spec §4.3).
pub const SASL_CHUNK_SIZE: usize = 400;

/// Send loop drains at most this many queued lines per batch (spec §4.1).
pub const SEND_BATCH_SIZE: usize = 5;

/// Autojoin channels are batched into `JOIN`s of this size (spec §4.1).
pub const AUTOJOIN_BATCH_SIZE: usize = 10;
