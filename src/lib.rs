//! Asynchronous per-server IRC session engine.
//!
//! This crate is the core of an IRC client framework: it maintains one
//! long-lived connection per [`session::Session`], turning IRC's
//! line-oriented, inherently asynchronous protocol into a request/response
//! API (`send` + `wait_for`), while driving CAP/STS/Resume negotiation and
//! SASL (including SCRAM) underneath.

pub mod casefold;
pub mod defaults;
pub mod error;
pub mod formatting;
pub mod glob;
pub mod ircv3;
pub mod line;
pub mod matching;
pub mod numerics;
pub mod sasl;
pub mod scram;
pub mod session;
pub mod throttle;
pub mod timeout;
pub mod transport;
pub mod whois;

pub use error::{Error, Result};
pub use line::Line;
pub use session::{ConnectionParams, NoopCallbacks, Priority, Session, SessionCallbacks, SentLine};
