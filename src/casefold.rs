//! ISUPPORT `CASEMAPPING`-aware folding, used by [`crate::matching::ParamMatcher::Folded`]
//! and by nickname/channel comparisons throughout the session engine.

/// The three `CASEMAPPING` values servers advertise via `RPL_ISUPPORT` (005).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMapping {
    #[default]
    Rfc1459,
    Ascii,
    Rfc1459Strict,
}

impl CaseMapping {
    pub fn parse(token: &str) -> CaseMapping {
        match token {
            "ascii" => CaseMapping::Ascii,
            "rfc1459-strict" => CaseMapping::Rfc1459Strict,
            _ => CaseMapping::Rfc1459,
        }
    }

    /// Fold a string the way this mapping would for nickname/channel comparison.
    pub fn casefold(&self, s: &str) -> String {
        match self {
            CaseMapping::Ascii => s.to_ascii_lowercase(),
            CaseMapping::Rfc1459 => fold_rfc1459(s, true),
            CaseMapping::Rfc1459Strict => fold_rfc1459(s, false),
        }
    }
}

fn fold_rfc1459(s: &str, include_tilde: bool) -> String {
    s.chars()
        .map(|c| match c {
            'A'..='Z' => c.to_ascii_lowercase(),
            '[' => '{',
            ']' => '}',
            '\\' => '|',
            '~' if include_tilde => '^',
            other => other,
        })
        .collect()
}
