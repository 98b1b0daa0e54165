/// Flow-control decision returned by a controlled-poll callback.
///
/// Progress past a record is "committed" once the consumer position covers
/// it; an uncommitted record is redelivered by the next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerAction {
    /// Commit this record and keep polling.
    Continue,
    /// Commit this record and publish the consumer position immediately,
    /// rather than at the end of the poll.
    Commit,
    /// Commit this record and stop polling.
    Break,
    /// Do not commit this record; stop polling. Only supported by
    /// single-consumer rings, where the record has not yet been claimed
    /// irrevocably.
    Abort,
}
