//! The `host[:[+|~]port]` shorthand (spec §6 EXTERNAL INTERFACES), for CLIs
//! and config files that want to write one string instead of three fields.
//!
//! Implemented as a `serde_with::{SerializeDisplay, DeserializeFromStr}`
//! wrapper around a hand-written `FromStr`/`Display` pair.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

use super::TlsMode;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostAddrError {
    #[error("empty host string")]
    Empty,
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("unterminated IPv6 literal: missing closing ']'")]
    UnterminatedIpv6,
}

/// A resolved `(host, port, tls mode)` triple parsed from shorthand like
/// `irc.example:+6697`, `irc.example:~`, `irc.example`, or `[::1]:+`.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct HostAddr {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
}

impl HostAddr {
    pub fn new(host: impl Into<String>, port: u16, tls: TlsMode) -> HostAddr {
        HostAddr {
            host: host.into(),
            port,
            tls,
        }
    }
}

impl FromStr for HostAddr {
    type Err = HostAddrError;

    fn from_str(s: &str) -> Result<HostAddr, HostAddrError> {
        if s.is_empty() {
            return Err(HostAddrError::Empty);
        }

        let (host, rest) = if let Some(stripped) = s.strip_prefix('[') {
            let (inside, after) = stripped
                .split_once(']')
                .ok_or(HostAddrError::UnterminatedIpv6)?;
            (inside.to_string(), after)
        } else {
            match s.split_once(':') {
                Some((host, rest)) => (host.to_string(), rest),
                None => (s.to_string(), ""),
            }
        };

        let port_spec = rest.strip_prefix(':').unwrap_or(rest);

        let (tls, port_digits) = if let Some(digits) = port_spec.strip_prefix('+') {
            (TlsMode::VerifyChain, digits)
        } else if let Some(digits) = port_spec.strip_prefix('~') {
            (TlsMode::NoVerify, digits)
        } else {
            (TlsMode::None, port_spec)
        };

        let port = if port_digits.is_empty() {
            match tls {
                TlsMode::VerifyChain | TlsMode::NoVerify => 6697,
                _ => 6667,
            }
        } else {
            port_digits
                .parse()
                .map_err(|_| HostAddrError::InvalidPort(port_digits.to_string()))?
        };

        Ok(HostAddr { host, port, tls })
    }
}

impl fmt::Display for HostAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:", self.host)?;
        } else {
            write!(f, "{}:", self.host)?;
        }
        match self.tls {
            TlsMode::VerifyChain => write!(f, "+{}", self.port),
            TlsMode::NoVerify => write!(f, "~{}", self.port),
            TlsMode::None | TlsMode::VerifySha512Pinned(_) => write!(f, "{}", self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_host_defaults_to_6667() {
        let addr: HostAddr = "irc.example".parse().unwrap();
        assert_eq!(addr.host, "irc.example");
        assert_eq!(addr.port, 6667);
        assert_eq!(addr.tls, TlsMode::None);
    }

    #[test]
    fn verify_chain_shorthand_defaults_to_6697() {
        let addr: HostAddr = "irc.example:+".parse().unwrap();
        assert_eq!(addr.port, 6697);
        assert_eq!(addr.tls, TlsMode::VerifyChain);
    }

    #[test]
    fn no_verify_shorthand_with_explicit_port() {
        let addr: HostAddr = "irc.example:~6697".parse().unwrap();
        assert_eq!(addr.port, 6697);
        assert_eq!(addr.tls, TlsMode::NoVerify);
    }

    #[test]
    fn plain_with_explicit_port() {
        let addr: HostAddr = "irc.example:6668".parse().unwrap();
        assert_eq!(addr.port, 6668);
        assert_eq!(addr.tls, TlsMode::None);
    }

    #[test]
    fn ipv6_literal_round_trips() {
        let addr: HostAddr = "[::1]:+".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 6697);
        assert_eq!(addr.tls, TlsMode::VerifyChain);
        assert_eq!(addr.to_string(), "[::1]:+6697");
    }

    #[test]
    fn rejects_empty_string() {
        assert_eq!("".parse::<HostAddr>(), Err(HostAddrError::Empty));
    }
}
