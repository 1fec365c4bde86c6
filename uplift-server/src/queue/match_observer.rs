use crate::queue::MatchRecord;

/// Told about every match the queue produces, from inside the queue actor.
///
/// Implementations must not block: the queue is serialised behind this call.
pub trait MatchObserver: Send + Sync + 'static {
    fn on_match(&self, record: MatchRecord);
}

/// Observer that ignores matches.
pub struct NoopMatchObserver;

impl MatchObserver for NoopMatchObserver {
    fn on_match(&self, _record: MatchRecord) {}
}
