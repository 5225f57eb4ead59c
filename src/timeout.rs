use futures::Future;
use std::time::Duration;
use tokio::time::Timeout;

/// Attach a deadline to any future, the way every `wait_for`/connect call
/// in this crate does.
pub trait WithTimeout {
    fn with_timeout(self, duration: Duration) -> Timeout<Self>
    where
        Self: Sized;
}

impl<T> WithTimeout for T
where
    T: Future + Sized,
{
    fn with_timeout(self, duration: Duration) -> Timeout<Self> {
        tokio::time::timeout(duration, self)
    }
}
