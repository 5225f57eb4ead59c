//! The multi-line WHOIS accumulator (spec §3 `Whois`).
//!
//! `send_whois` feeds each numeric into [`Whois::apply`] as it arrives;
//! `RPL_ENDOFWHOIS` or either of the two not-found numerics closes it out
//! (see spec §9 DESIGN NOTES on the `ERR_NOSUCHNICK`/`ERR_NOSUCHSERVER`
//! resolution of the original's `ERR_NOSUCHUSER` ambiguity).

use crate::line::Line;
use crate::numerics;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whois {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
    pub realname: Option<String>,
    pub server: Option<String>,
    pub server_info: Option<String>,
    pub operator: bool,
    pub secure: bool,
    pub signon: Option<String>,
    pub idle: Option<u64>,
    pub account: Option<String>,
    pub channels: Vec<(String, String, String)>,
}

/// What happened to an in-progress accumulator after feeding it one line.
pub enum WhoisStep {
    /// Not a WHOIS-related numeric; the accumulator is unchanged.
    Ignored,
    /// A WHOIS numeric was folded in; more may follow.
    InProgress,
    /// `RPL_ENDOFWHOIS` arrived; the accumulator is complete.
    Done,
    /// The target doesn't exist: `ERR_NOSUCHNICK`/`ERR_NOSUCHSERVER`.
    NotFound,
}

impl Whois {
    pub fn new(nickname: impl Into<String>) -> Whois {
        Whois {
            nickname: nickname.into(),
            ..Whois::default()
        }
    }

    /// Fold one incoming line into this accumulator.
    pub fn apply(&mut self, line: &Line) -> WhoisStep {
        match line.command.as_str() {
            c if c == numerics::RPL_WHOISUSER => {
                if let [_, _nick, username, hostname, _star, realname, ..] = line.params.as_slice() {
                    self.username = Some(username.clone());
                    self.hostname = Some(hostname.clone());
                    self.realname = Some(realname.clone());
                }
                WhoisStep::InProgress
            }
            c if c == numerics::RPL_WHOISSERVER => {
                if let [_, _nick, server, info, ..] = line.params.as_slice() {
                    self.server = Some(server.clone());
                    self.server_info = Some(info.clone());
                }
                WhoisStep::InProgress
            }
            c if c == numerics::RPL_WHOISOPERATOR => {
                self.operator = true;
                WhoisStep::InProgress
            }
            c if c == numerics::RPL_WHOISIDLE => {
                if let [_, _nick, idle, signon, ..] = line.params.as_slice() {
                    self.idle = idle.parse().ok();
                    self.signon = Some(signon.clone());
                }
                WhoisStep::InProgress
            }
            c if c == numerics::RPL_WHOISCHANNELS => {
                if let [_, _nick, channels_str, ..] = line.params.as_slice() {
                    for entry in channels_str.split_whitespace() {
                        let (modes, channel) = split_prefix_modes(entry);
                        self.channels.push((self.nickname.clone(), channel, modes));
                    }
                }
                WhoisStep::InProgress
            }
            c if c == numerics::RPL_WHOISACCOUNT => {
                if let [_, _nick, account, ..] = line.params.as_slice() {
                    self.account = Some(account.clone());
                }
                WhoisStep::InProgress
            }
            c if c == numerics::RPL_WHOISSECURE => {
                self.secure = true;
                WhoisStep::InProgress
            }
            c if c == numerics::RPL_ENDOFWHOIS => WhoisStep::Done,
            c if c == numerics::ERR_NOSUCHNICK || c == numerics::ERR_NOSUCHSERVER => WhoisStep::NotFound,
            _ => WhoisStep::Ignored,
        }
    }
}

/// Split a `RPL_WHOISCHANNELS` entry like `@#chan` or `+&ops` into its
/// leading status-prefix characters and the bare channel name.
fn split_prefix_modes(entry: &str) -> (String, String) {
    let split_at = entry
        .char_indices()
        .find(|(_, c)| c.is_alphanumeric() || *c == '#' || *c == '&')
        .map(|(i, _)| i)
        .unwrap_or(0);
    (entry[..split_at].to_string(), entry[split_at..].to_string())
}
