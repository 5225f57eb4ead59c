//! The single-outstanding-WHO-per-session queue (spec §4.1 "WHO after
//! JOIN ordering").

use std::collections::VecDeque;

/// Channel names waiting for a `WHO`/`WHOX`, each paired with its folded
/// form so `RPL_ENDOFWHO` matching is casemapping-aware while the actual
/// `WHO <channel>` command still uses the channel's original casing. At
/// most one entry is outstanding at a time; `RPL_ENDOFWHO` for the head
/// advances the queue.
#[derive(Debug, Default)]
pub struct WhoQueue {
    queue: VecDeque<(String, String)>,
}

impl WhoQueue {
    pub fn new() -> WhoQueue {
        WhoQueue::default()
    }

    /// Enqueue `display` (keyed by its already-folded form). Returns
    /// `true` if this transitioned the queue from empty to non-empty,
    /// i.e. the caller should issue `WHO <display>` immediately.
    pub fn push(&mut self, folded: String, display: String) -> bool {
        let was_empty = self.queue.is_empty();
        self.queue.push_back((folded, display));
        was_empty
    }

    /// `RPL_ENDOFWHO` arrived for `folded`. If it matches the head, pop it
    /// and return the next channel to `WHO`, if any.
    pub fn complete(&mut self, folded: &str) -> Option<String> {
        if self.queue.front().map(|(f, _)| f.as_str()) == Some(folded) {
            self.queue.pop_front();
            self.queue.front().map(|(_, display)| display.clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_signals_start() {
        let mut queue = WhoQueue::new();
        assert!(queue.push("#a".to_string(), "#a".to_string()));
        assert!(!queue.push("#b".to_string(), "#b".to_string()));
    }

    #[test]
    fn complete_advances_to_next() {
        let mut queue = WhoQueue::new();
        queue.push("#a".to_string(), "#a".to_string());
        queue.push("#b".to_string(), "#B".to_string());
        assert_eq!(queue.complete("#a"), Some("#B".to_string()));
        assert_eq!(queue.complete("#b"), None);
    }

    #[test]
    fn complete_ignores_mismatched_head() {
        let mut queue = WhoQueue::new();
        queue.push("#a".to_string(), "#a".to_string());
        assert_eq!(queue.complete("#z"), None);
    }
}
