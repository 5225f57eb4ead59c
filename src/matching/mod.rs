//! Declarative predicates over parsed lines: the `Matcher`/`ParamMatcher`/
//! `HostmaskMatcher` sum types of spec §3 DATA MODEL and §9 DESIGN NOTES
//! (closed tagged variants in place of the original's duck-typed
//! `match(server, line|arg)` dispatch).
//!
//! Ported in spirit from `examples/original_source/ircrobots/matching.py`
//! and `ircrobots/matching/{params,responses}.py`.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::glob::Glob;
use crate::line::{Hostmask, Line};

/// Whatever a matcher needs to know about the session it's running
/// against: how to casefold, and who "we" are. `Session` implements this;
/// tests use a small stub (see `session::tests`).
pub trait MatchContext {
    fn casefold(&self, s: &str) -> String;
    fn self_nickname(&self) -> &str;
    fn self_hostmask(&self) -> Hostmask;
}

/// A positional-parameter predicate.
pub enum ParamMatcher {
    AnyParam,
    Literal(String),
    /// Casefold both sides using the session's ISUPPORT `CASEMAPPING`;
    /// the folded form of `value` is memoized on first match.
    Folded {
        value: String,
        cached: RefCell<Option<String>>,
    },
    /// Strip IRC formatting codes from the argument, then compare literally.
    Formatless(String),
    Regex(regex::Regex),
    /// Matches iff the argument equals the session's own casefolded nick.
    SelfNick,
    Not(Box<ParamMatcher>),
}

impl ParamMatcher {
    pub fn folded(value: impl Into<String>) -> ParamMatcher {
        ParamMatcher::Folded {
            value: value.into(),
            cached: RefCell::new(None),
        }
    }

    pub fn not(inner: ParamMatcher) -> ParamMatcher {
        ParamMatcher::Not(Box::new(inner))
    }

    pub fn is_match(&self, ctx: &dyn MatchContext, arg: &str) -> bool {
        match self {
            ParamMatcher::AnyParam => true,
            ParamMatcher::Literal(v) => v == arg,
            ParamMatcher::Folded { value, cached } => {
                let folded_value = {
                    let mut cache = cached.borrow_mut();
                    if cache.is_none() {
                        *cache = Some(ctx.casefold(value));
                    }
                    cache.clone().unwrap()
                };
                folded_value == ctx.casefold(arg)
            }
            ParamMatcher::Formatless(v) => crate::formatting::strip(arg) == *v,
            ParamMatcher::Regex(re) => re.is_match(arg),
            ParamMatcher::SelfNick => ctx.casefold(ctx.self_nickname()) == ctx.casefold(arg),
            ParamMatcher::Not(inner) => !inner.is_match(ctx, arg),
        }
    }
}

/// A predicate over a line's `source` hostmask.
pub enum HostmaskMatcher {
    Nick(String),
    Mask(Glob),
    MaskSelf,
}

impl HostmaskMatcher {
    pub fn mask(pattern: &str) -> HostmaskMatcher {
        HostmaskMatcher::Mask(Glob::compile(pattern))
    }

    pub fn is_match(&self, ctx: &dyn MatchContext, hostmask: &Hostmask) -> bool {
        match self {
            HostmaskMatcher::Nick(nick) => ctx.casefold(nick) == ctx.casefold(&hostmask.nickname),
            HostmaskMatcher::Mask(glob) => glob.is_match(&hostmask.to_string()),
            HostmaskMatcher::MaskSelf => {
                ctx.casefold(&ctx.self_hostmask().to_string()) == ctx.casefold(&hostmask.to_string())
            }
        }
    }
}

/// The top-level matcher sum type (spec §3 `Matcher`).
pub enum Matcher {
    Responses {
        commands: HashSet<String>,
        params: Vec<ParamMatcher>,
        source: Option<HostmaskMatcher>,
    },
    Any(Vec<Matcher>),
}

impl Matcher {
    /// `Responses(commands, [], None)` convenience constructor.
    pub fn commands(commands: impl IntoIterator<Item = impl Into<String>>) -> Matcher {
        Matcher::Responses {
            commands: commands.into_iter().map(Into::into).collect(),
            params: Vec::new(),
            source: None,
        }
    }

    pub fn with_params(mut self, params: Vec<ParamMatcher>) -> Matcher {
        if let Matcher::Responses { params: slot, .. } = &mut self {
            *slot = params;
        }
        self
    }

    pub fn with_source(mut self, source: HostmaskMatcher) -> Matcher {
        if let Matcher::Responses { source: slot, .. } = &mut self {
            *slot = Some(source);
        }
        self
    }

    /// Disjunction convenience over a set of matchers (spec §E.6;
    /// the original's `ResponseOr`/`Any`).
    pub fn any_of(matchers: Vec<Matcher>) -> Matcher {
        Matcher::Any(matchers)
    }

    pub fn is_match(&self, ctx: &dyn MatchContext, line: &Line) -> bool {
        match self {
            Matcher::Responses {
                commands,
                params,
                source,
            } => {
                if !commands.contains(&line.command) {
                    return false;
                }
                if let Some(source_matcher) = source {
                    match &line.source {
                        Some(hostmask) if source_matcher.is_match(ctx, hostmask) => {}
                        _ => return false,
                    }
                }
                for (i, param) in params.iter().enumerate() {
                    match line.params.get(i) {
                        Some(arg) if param.is_match(ctx, arg) => {}
                        _ => return false,
                    }
                }
                true
            }
            Matcher::Any(matchers) => matchers.iter().any(|m| m.is_match(ctx, line)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Line;

    struct Stub;
    impl MatchContext for Stub {
        fn casefold(&self, s: &str) -> String {
            crate::casefold::CaseMapping::Rfc1459.casefold(s)
        }
        fn self_nickname(&self) -> &str {
            "alice"
        }
        fn self_hostmask(&self) -> Hostmask {
            Hostmask {
                nickname: "alice".into(),
                username: Some("a".into()),
                hostname: Some("h".into()),
            }
        }
    }

    #[test]
    fn responses_matches_command_and_params() {
        let line = Line::parse(":srv 001 alice :hi").unwrap();
        let matcher = Matcher::commands(["001"]).with_params(vec![ParamMatcher::folded("alice")]);
        assert!(matcher.is_match(&Stub, &line));
    }

    #[test]
    fn responses_fails_on_mismatched_param() {
        let line = Line::parse(":srv 001 alice :hi").unwrap();
        let matcher = Matcher::commands(["001"]).with_params(vec![ParamMatcher::Literal("bob".into())]);
        assert!(!matcher.is_match(&Stub, &line));
    }

    #[test]
    fn any_matcher_is_disjunction() {
        let line = Line::parse(":srv PRIVMSG #c :hi").unwrap();
        let matcher = Matcher::any_of(vec![
            Matcher::commands(["NOTICE"]),
            Matcher::commands(["PRIVMSG"]),
        ]);
        assert!(matcher.is_match(&Stub, &line));
    }

    #[test]
    fn not_inverts_inner_param_matcher() {
        let line = Line::parse(":srv 001 alice :hi").unwrap();
        let matcher = Matcher::commands(["001"])
            .with_params(vec![ParamMatcher::not(ParamMatcher::Literal("bob".into()))]);
        assert!(matcher.is_match(&Stub, &line));
    }

    #[test]
    fn self_nick_matcher_compares_folded() {
        let line = Line::parse(":srv 001 ALICE :hi").unwrap();
        let matcher = Matcher::commands(["001"]).with_params(vec![ParamMatcher::SelfNick]);
        assert!(matcher.is_match(&Stub, &line));
    }

    #[test]
    fn hostmask_nick_matcher_checks_source() {
        let line = Line::parse(":bob!u@h PRIVMSG #c :hi").unwrap();
        let matcher = Matcher::commands(["PRIVMSG"]).with_source(HostmaskMatcher::Nick("bob".into()));
        assert!(matcher.is_match(&Stub, &line));

        let wrong_source = Matcher::commands(["PRIVMSG"]).with_source(HostmaskMatcher::Nick("carol".into()));
        assert!(!wrong_source.is_match(&Stub, &line));
    }

    #[test]
    fn mask_self_matches_own_hostmask() {
        let line = Line::parse(":alice!a@h PRIVMSG #c :hi").unwrap();
        let matcher = Matcher::commands(["PRIVMSG"]).with_source(HostmaskMatcher::MaskSelf);
        assert!(matcher.is_match(&Stub, &line));
    }
}
