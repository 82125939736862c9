use std::io;
use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error("Timed out connecting to APRS-IS server")]
    Timeout(#[from] Elapsed),
}

#[derive(Error, Debug)]
pub enum ReadError {
    /// Reading from the server or writing to the output failed.
    #[error(transparent)]
    IoError(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Could not connect to APRS-IS server: {0}")]
    Connect(#[from] ConnectError),

    #[error("Error reading APRS-IS feed: {0}")]
    Read(#[from] ReadError),
}
