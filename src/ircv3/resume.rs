//! The `draft/resume-0.5` token handed to the `resume_policy` callback
//! and carried forward in `ConnectionParams` (spec §3, §4.2).

/// A resume token bound to the server address it was issued on. Handed to
/// `resume_policy` for the caller to persist (spec §6 persisted state),
/// hence `Serialize`/`Deserialize`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResumePolicy {
    pub address: String,
    pub token: String,
}

impl ResumePolicy {
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> ResumePolicy {
        ResumePolicy {
            address: address.into(),
            token: token.into(),
        }
    }
}
