use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("invalid broker url `{0}`")]
    InvalidUrl(String),

    #[error("connect: {0}")]
    Connect(String),

    #[error("subscribe: {0}")]
    Subscribe(String),

    #[error("publish: {0}")]
    Publish(String),

    #[error("unsubscribe: {0}")]
    Unsubscribe(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("session closed")]
    Closed,
}
