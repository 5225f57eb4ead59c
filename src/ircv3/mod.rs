//! IRCv3 capability negotiation: the `Capability` table, and the STS /
//! resume sub-protocols layered on top of it (spec §3, §4.2).

pub mod resume;
pub mod sts;

pub use resume::ResumePolicy;
pub use sts::{StsAdvertisement, StsPolicy};

use std::collections::HashSet;

/// One capability a session may request, identified by its ratified
/// and/or draft name (spec §3 `Capability`).
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    pub ratified_name: Option<&'static str>,
    pub draft_name: Option<&'static str>,
    pub alias: &'static str,
    /// Other capability aliases this one depends on. Carried over from the
    /// upstream `Capability` type (spec §3); nothing in the negotiation
    /// loop consults it yet, same as upstream.
    pub depends_on: &'static [&'static str],
}

impl Capability {
    pub const fn new(
        ratified_name: Option<&'static str>,
        draft_name: Option<&'static str>,
        alias: &'static str,
    ) -> Capability {
        Capability {
            ratified_name,
            draft_name,
            alias,
            depends_on: &[],
        }
    }

    /// First of `[ratified, draft]` present in `advertised`, if any.
    pub fn available(&self, advertised: &HashSet<String>) -> Option<&'static str> {
        if let Some(ratified) = self.ratified_name {
            if advertised.contains(ratified) {
                return Some(ratified);
            }
        }
        if let Some(draft) = self.draft_name {
            if advertised.contains(draft) {
                return Some(draft);
            }
        }
        None
    }

    /// Whether `name` is one of this capability's ratified/draft spellings.
    pub fn matches(&self, name: &str) -> bool {
        self.ratified_name == Some(name) || self.draft_name == Some(name)
    }
}

/// The built-in capability set every session requests by default, in
/// addition to anything the caller adds via `desired_caps` (spec §4.2).
pub const BUILTIN_CAPS: &[Capability] = &[
    Capability::new(Some("multi-prefix"), None, "multi-prefix"),
    Capability::new(Some("chghost"), None, "chghost"),
    Capability::new(Some("away-notify"), None, "away-notify"),
    Capability::new(Some("invite-notify"), None, "invite-notify"),
    Capability::new(Some("account-tag"), None, "account-tag"),
    Capability::new(Some("account-notify"), None, "account-notify"),
    Capability::new(Some("extended-join"), None, "extended-join"),
    Capability::new(Some("message-tags"), Some("draft/message-tags-0.2"), "message-tags"),
    Capability::new(Some("cap-notify"), None, "cap-notify"),
    Capability::new(Some("batch"), None, "batch"),
    Capability::new(None, Some("draft/rename"), "rename"),
    Capability::new(Some("setname"), Some("draft/setname"), "setname"),
    Capability::new(None, Some("draft/resume-0.5"), "resume"),
    Capability::new(
        Some("labeled-response"),
        Some("draft/labeled-response-0.2"),
        "labeled-response",
    ),
    Capability::new(Some("echo-message"), None, "echo-message"),
];

/// Requested only when `ConnectionParams::sasl` is set.
pub const SASL_CAP: Capability = Capability::new(Some("sasl"), None, "sasl");

/// The `sts`/`draft/sts` capability, checked specially because it drives
/// a reconnect rather than a plain `CAP REQ`.
pub const STS_CAP: Capability = Capability::new(Some("sts"), Some("draft/sts"), "sts");

/// One `CAP LS` token, split into its bare name and optional `=value`.
pub fn parse_ls_token(token: &str) -> (String, Option<String>) {
    match token.split_once('=') {
        Some((name, value)) => (name.to_string(), Some(value.to_string())),
        None => (token.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_prefers_ratified_name() {
        let advertised: HashSet<String> = ["setname".to_string(), "draft/setname".to_string()].into();
        let cap = BUILTIN_CAPS.iter().find(|c| c.alias == "setname").unwrap();
        assert_eq!(cap.available(&advertised), Some("setname"));
    }

    #[test]
    fn available_falls_back_to_draft_name() {
        let advertised: HashSet<String> = ["draft/setname".to_string()].into();
        let cap = BUILTIN_CAPS.iter().find(|c| c.alias == "setname").unwrap();
        assert_eq!(cap.available(&advertised), Some("draft/setname"));
    }

    #[test]
    fn available_is_none_when_absent() {
        let advertised: HashSet<String> = ["multi-prefix".to_string()].into();
        let cap = BUILTIN_CAPS.iter().find(|c| c.alias == "echo-message").unwrap();
        assert_eq!(cap.available(&advertised), None);
    }

    #[test]
    fn parse_ls_token_splits_value() {
        assert_eq!(
            parse_ls_token("sasl=PLAIN,SCRAM-SHA-256"),
            ("sasl".to_string(), Some("PLAIN,SCRAM-SHA-256".to_string()))
        );
        assert_eq!(parse_ls_token("multi-prefix"), ("multi-prefix".to_string(), None));
    }
}
