pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("`clients` must be a positive integer")]
    InvalidClients,

    #[error("`messages` must be a positive integer")]
    InvalidMessages,

    #[error("`global_timeout` must be a positive duration")]
    InvalidGlobalTimeout,
}
