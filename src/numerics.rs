//! Readable names for the numeric replies this crate cares about.
//!
//! The wire always carries the three-digit string (`"001"`); this table
//! exists so matcher/handshake code can read `numerics::RPL_WELCOME`
//! instead of a bare literal. Supplemented from
//! `examples/original_source/ircrobots/numerics.py` (spec §E.6).

pub const RPL_WELCOME: &str = "001";
pub const RPL_ISUPPORT: &str = "005";
pub const RPL_ENDOFMOTD: &str = "376";
pub const ERR_NOMOTD: &str = "422";
pub const RPL_LOGOFF: &str = "601";
pub const RPL_MONOFFLINE: &str = "730";
pub const RPL_ENDOFWHO: &str = "315";
pub const RPL_WHOISUSER: &str = "311";
pub const RPL_WHOISSERVER: &str = "312";
pub const RPL_WHOISOPERATOR: &str = "313";
pub const RPL_WHOISIDLE: &str = "317";
pub const RPL_ENDOFWHOIS: &str = "318";
pub const RPL_WHOISCHANNELS: &str = "319";
pub const RPL_WHOISACCOUNT: &str = "330";
pub const RPL_WHOISSECURE: &str = "671";
pub const ERR_NOSUCHNICK: &str = "401";
pub const ERR_NOSUCHSERVER: &str = "402";
pub const ERR_NICKNAMEINUSE: &str = "433";
pub const ERR_ERRONEUSNICKNAME: &str = "432";
pub const RPL_LOGGEDIN: &str = "900";
pub const RPL_SASLSUCCESS: &str = "903";
pub const ERR_SASLFAIL: &str = "904";
pub const ERR_SASLTOOLONG: &str = "905";
pub const ERR_SASLABORTED: &str = "906";
pub const ERR_SASLALREADY: &str = "907";
pub const RPL_SASLMECHS: &str = "908";
