use thiserror::Error;

/// Reasons a raw wire line fails to become an `Event`.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("bad event payload format")]
    BadFormat,

    #[error("unknown event type {0:?}")]
    UnknownEventType(char),

    #[error("expected {want} arguments, got {got}")]
    BadArgumentCount { want: usize, got: usize },
}

/// Outcomes of [`crate::reorder::ReorderBuffer::insert`] other than success.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("event sequence number too small")]
    TooSmall,

    #[error("event sequence number too large")]
    TooLarge,

    #[error("duplicate event sequence number")]
    Duplicate,
}

/// [`crate::router::Router::subscribe`] failure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("queue already subscribed under another id")]
    AlreadySubscribed,
}
