//! `ConnectionParams` (spec §3) and the small value types it's built from.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::ircv3::{ResumePolicy, StsPolicy};
use crate::sasl::SaslParams;
use crate::transport::TlsMode;

/// Everything a `connect()` needs besides the transport itself.
///
/// `Serialize`/`Deserialize` so a caller can load this straight out of a
/// config file rather than construct it by hand.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConnectionParams {
    pub nickname: String,
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
    pub username: Option<String>,
    pub realname: Option<String>,
    pub bindhost: Option<IpAddr>,
    pub password: Option<String>,
    pub sasl: Option<SaslParams>,
    pub sts: Option<StsPolicy>,
    pub resume: Option<ResumePolicy>,
    pub reconnect_seconds: u64,
    pub alt_nicknames: Vec<String>,
    pub autojoin: Vec<String>,
    /// Capability names requested in addition to the built-in set.
    pub desired_caps: HashSet<String>,
}

impl ConnectionParams {
    pub fn new(nickname: impl Into<String>, host: impl Into<String>, port: u16) -> ConnectionParams {
        let nickname = nickname.into();
        ConnectionParams {
            alt_nicknames: default_alt_nicknames(&nickname),
            nickname,
            host: host.into(),
            port,
            tls: TlsMode::None,
            username: None,
            realname: None,
            bindhost: None,
            password: None,
            sasl: None,
            sts: None,
            resume: None,
            reconnect_seconds: crate::defaults::RECONNECT_SECONDS,
            autojoin: Vec::new(),
            desired_caps: HashSet::new(),
        }
    }

    pub fn username_or_nick(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nickname)
    }

    pub fn realname_or_nick(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }

    /// The host to actually dial: a resume policy's address takes
    /// priority over the configured host (spec §3 `ResumePolicy`, §4.1
    /// `connect`).
    pub fn effective_host(&self) -> &str {
        match &self.resume {
            Some(policy) => &policy.address,
            None => &self.host,
        }
    }

    /// STS transmutation (spec §4.1 `connect`, §4.2 STS): if a cached
    /// policy is still within its window and we aren't already using TLS,
    /// upgrade the connect target to the policy's port over verify-chain
    /// TLS.
    pub fn apply_sts(&mut self, now_unix: u64) {
        if self.tls != TlsMode::None {
            return;
        }
        if let Some(policy) = &self.sts {
            if policy.is_active(now_unix) {
                self.port = policy.port;
                self.tls = TlsMode::VerifyChain;
            }
        }
    }
}

/// `nick_`, `nick__`, `nick___` — the default fallback ladder tried on
/// `ERR_NICKNAMEINUSE`/`ERR_ERRONEUSNICKNAME` before registration.
pub fn default_alt_nicknames(nickname: &str) -> Vec<String> {
    (1..=3).map(|n| format!("{nickname}{}", "_".repeat(n))).collect()
}
