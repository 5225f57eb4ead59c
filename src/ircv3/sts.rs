//! STS (Strict Transport Security for IRC) advertisement parsing and the
//! persisted policy handed to the `sts_policy` callback (spec §4.2).

/// The `sts=k=v,...` (or `draft/sts=`) CAP LS token value, parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StsAdvertisement {
    pub port: Option<u16>,
    pub duration_seconds: Option<u64>,
    pub preload: bool,
}

impl StsAdvertisement {
    pub fn parse(value: &str) -> StsAdvertisement {
        let mut advertisement = StsAdvertisement::default();
        for piece in value.split(',') {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match piece.split_once('=') {
                Some(("port", v)) => advertisement.port = v.parse().ok(),
                Some(("duration", v)) => advertisement.duration_seconds = v.parse().ok(),
                Some((k, _)) if k == "preload" => advertisement.preload = true,
                None if piece == "preload" => advertisement.preload = true,
                _ => {}
            }
        }
        advertisement
    }
}

/// A cached STS policy (spec §3 `STSPolicy`): causes an immediate TLS
/// upgrade on next connect while still within `duration_seconds` of
/// `created_unix`. Handed to `sts_policy` for the caller to persist
/// (spec §6 persisted state), hence `Serialize`/`Deserialize`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StsPolicy {
    pub created_unix: u64,
    pub port: u16,
    pub duration_seconds: u64,
    pub preload: bool,
}

impl StsPolicy {
    pub fn new(created_unix: u64, port: u16, duration_seconds: u64, preload: bool) -> StsPolicy {
        StsPolicy {
            created_unix,
            port,
            duration_seconds,
            preload,
        }
    }

    pub fn is_active(&self, now_unix: u64) -> bool {
        now_unix.saturating_sub(self.created_unix) < self.duration_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_port_and_duration() {
        let advertisement = StsAdvertisement::parse("port=6697,duration=3600");
        assert_eq!(advertisement.port, Some(6697));
        assert_eq!(advertisement.duration_seconds, Some(3600));
        assert!(!advertisement.preload);
    }

    #[test]
    fn parses_preload_flag() {
        let advertisement = StsAdvertisement::parse("duration=3600,preload");
        assert!(advertisement.preload);
    }

    #[test]
    fn policy_is_active_within_duration() {
        let policy = StsPolicy::new(1000, 6697, 3600, false);
        assert!(policy.is_active(1000 + 3599));
        assert!(!policy.is_active(1000 + 3600));
    }
}
