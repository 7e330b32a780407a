use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cost oracle error: {0}")]
    Oracle(String),

    #[error("Candidate discovery error: {0}")]
    Discovery(String),

    #[error("Unknown index id: {0}")]
    UnknownIndex(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Task cancelled")]
    Cancelled,

    #[error("Advisor is shut down")]
    Shutdown,
}
