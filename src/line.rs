//! The wire line model: IRCv3 message-tags, `:nick!user@host` sources,
//! commands, and space-separated params with a `:trailing` tail.
//!
//! Grounded on RFC 1459/2812 plus the IRCv3 message-tags spec; see spec.md
//! §6 EXTERNAL INTERFACES.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ProtocolError;

/// A `nick!user@host` source, with parts present only as far as the peer
/// actually sent them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hostmask {
    pub nickname: String,
    pub username: Option<String>,
    pub hostname: Option<String>,
}

impl Hostmask {
    /// Parse a `nick[!user][@host]` string.
    pub fn parse(s: &str) -> Hostmask {
        let (nick_user, hostname) = match s.split_once('@') {
            Some((a, b)) => (a, Some(b.to_string())),
            None => (s, None),
        };
        let (nickname, username) = match nick_user.split_once('!') {
            Some((a, b)) => (a.to_string(), Some(b.to_string())),
            None => (nick_user.to_string(), None),
        };
        Hostmask {
            nickname,
            username,
            hostname,
        }
    }
}

impl fmt::Display for Hostmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.nickname)?;
        if let Some(user) = &self.username {
            write!(f, "!{user}")?;
        }
        if let Some(host) = &self.hostname {
            write!(f, "@{host}")?;
        }
        Ok(())
    }
}

/// A fully parsed (or about-to-be-sent) IRC line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    /// Ordered so two lines built from the same tags compare/format deterministically.
    pub tags: BTreeMap<String, Option<String>>,
    pub source: Option<Hostmask>,
    pub command: String,
    pub params: Vec<String>,
}

impl Line {
    /// Build a line with no tags or source, as a client normally sends.
    pub fn build(command: impl Into<String>, params: impl IntoIterator<Item = String>) -> Line {
        Line {
            tags: BTreeMap::new(),
            source: None,
            command: command.into(),
            params: params.into_iter().collect(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: Option<String>) -> Line {
        self.tags.insert(key.into(), value);
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).and_then(|v| v.as_deref())
    }

    /// Parse a single line (without the trailing `\r\n`).
    pub fn parse(raw: &str) -> Result<Line, ProtocolError> {
        let mut rest = raw;
        let mut tags = BTreeMap::new();

        if let Some(tag_body) = rest.strip_prefix('@') {
            let (tag_str, remainder) = tag_body
                .split_once(' ')
                .ok_or_else(|| ProtocolError::ParseFailed(raw.to_string()))?;
            for piece in tag_str.split(';') {
                if piece.is_empty() {
                    continue;
                }
                match piece.split_once('=') {
                    Some((k, v)) => {
                        tags.insert(unescape_tag_value(k), Some(unescape_tag_value(v)));
                    }
                    None => {
                        tags.insert(unescape_tag_value(piece), None);
                    }
                }
            }
            rest = remainder.trim_start_matches(' ');
        }

        let mut source = None;
        if let Some(source_body) = rest.strip_prefix(':') {
            let (source_str, remainder) = source_body
                .split_once(' ')
                .ok_or_else(|| ProtocolError::ParseFailed(raw.to_string()))?;
            source = Some(Hostmask::parse(source_str));
            rest = remainder.trim_start_matches(' ');
        }

        if rest.is_empty() {
            return Err(ProtocolError::ParseFailed(raw.to_string()));
        }

        let mut params = Vec::new();
        let mut remainder = rest;
        let command;
        loop {
            remainder = remainder.trim_start_matches(' ');
            if remainder.is_empty() {
                return Err(ProtocolError::ParseFailed(raw.to_string()));
            }
            if let Some(trailing) = remainder.strip_prefix(':') {
                params.push(trailing.to_string());
                remainder = "";
            } else if let Some((word, rest2)) = remainder.split_once(' ') {
                params.push(word.to_string());
                remainder = rest2;
                continue;
            } else {
                params.push(remainder.to_string());
                remainder = "";
            }
            break;
        }

        // The first "param" collected above when there was no leading source/tags
        // is actually the command; re-split cleanly below instead of threading
        // extra state through the loop.
        let mut parts = params.into_iter();
        command = parts
            .next()
            .ok_or_else(|| ProtocolError::ParseFailed(raw.to_string()))?;
        let params: Vec<String> = parts.collect();

        Ok(Line {
            tags,
            source,
            command: command.to_ascii_uppercase_if_alpha(),
            params,
        })
    }

    /// Render the line as it would appear on the wire, without `\r\n`.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.tags.is_empty() {
            out.push('@');
            let mut first = true;
            for (k, v) in &self.tags {
                if !first {
                    out.push(';');
                }
                first = false;
                out.push_str(&escape_tag_value(k));
                if let Some(v) = v {
                    out.push('=');
                    out.push_str(&escape_tag_value(v));
                }
            }
            out.push(' ');
        }
        if let Some(source) = &self.source {
            out.push(':');
            out.push_str(&source.to_string());
            out.push(' ');
        }
        out.push_str(&self.command);
        for (i, param) in self.params.iter().enumerate() {
            out.push(' ');
            let is_last = i == self.params.len() - 1;
            let needs_colon = is_last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                out.push(':');
            }
            out.push_str(param);
        }
        out
    }
}

trait CommandCase {
    fn to_ascii_uppercase_if_alpha(self) -> String;
}

impl CommandCase for String {
    fn to_ascii_uppercase_if_alpha(self) -> String {
        // Numerics stay as their three digits; named commands are case-insensitive
        // on the wire but every implementation normalizes to uppercase.
        if self.chars().all(|c| c.is_ascii_digit()) {
            self
        } else {
            self.to_ascii_uppercase()
        }
    }
}

fn escape_tag_value(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(';', "\\:")
        .replace(' ', "\\s")
        .replace('\r', "\\r")
        .replace('\n', "\\n")
}

fn unescape_tag_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(':') => out.push(';'),
                Some('s') => out.push(' '),
                Some('r') => out.push('\r'),
                Some('n') => out.push('\n'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split a buffer of freshly read bytes on `\r\n` (tolerating bare `\n`),
/// returning complete lines and leaving any partial tail in `buf`.
pub fn split_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        let newline = buf.iter().position(|&b| b == b'\n');
        let Some(idx) = newline else { break };
        let mut line_bytes: Vec<u8> = buf.drain(..=idx).collect();
        line_bytes.pop(); // '\n'
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        if !line_bytes.is_empty() {
            lines.push(String::from_utf8_lossy(&line_bytes).into_owned());
        }
    }
    lines
}

/// Tokenize raw text (as typed by a caller via `send_raw`) into a [`Line`].
pub fn tokenize(raw: &str) -> Result<Line, ProtocolError> {
    Line::parse(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_line() {
        let line = Line::parse(":srv 001 alice :hi there").unwrap();
        assert_eq!(line.source.unwrap().nickname, "srv");
        assert_eq!(line.command, "001");
        assert_eq!(line.params, vec!["alice", "hi there"]);
    }

    #[test]
    fn parses_tags_and_source() {
        let line = Line::parse("@label=123;draft/msgid=abc :nick!u@h PRIVMSG #c :hello world").unwrap();
        assert_eq!(line.tag("label"), Some("123"));
        assert_eq!(line.tag("draft/msgid"), Some("abc"));
        let source = line.source.unwrap();
        assert_eq!(source.nickname, "nick");
        assert_eq!(source.username.as_deref(), Some("u"));
        assert_eq!(source.hostname.as_deref(), Some("h"));
        assert_eq!(line.command, "PRIVMSG");
        assert_eq!(line.params, vec!["#c", "hello world"]);
    }

    #[test]
    fn round_trips_format() {
        let line = Line::build("PRIVMSG", vec!["#c".to_string(), "hello world".to_string()]);
        assert_eq!(line.format(), "PRIVMSG #c :hello world");
    }

    #[test]
    fn format_adds_colon_for_empty_trailing() {
        let line = Line::build("PING", vec!["".to_string()]);
        assert_eq!(line.format(), "PING :");
    }

    #[test]
    fn tag_escaping_round_trips() {
        let mut tags = BTreeMap::new();
        tags.insert("x".to_string(), Some("a;b c".to_string()));
        let line = Line {
            tags,
            source: None,
            command: "FOO".to_string(),
            params: vec![],
        };
        let formatted = line.format();
        let reparsed = Line::parse(&formatted).unwrap();
        assert_eq!(reparsed.tag("x"), Some("a;b c"));
    }

    #[test]
    fn split_lines_leaves_partial_tail() {
        let mut buf = b"PING :x\r\nPAR".to_vec();
        let lines = split_lines(&mut buf);
        assert_eq!(lines, vec!["PING :x".to_string()]);
        assert_eq!(buf, b"PAR");
    }
}
