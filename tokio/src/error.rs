//! Errors for the sharded table front end.

use kvtable_core::error::insert::InsertError;
use std::error::Error;
use std::{fmt, io};

/// Error from commit() and the write paths.
#[derive(Debug)]
pub enum SyncError {
    /// A write applied since the last commit failed, this is the first such error.
    PreviousInsertFailed(InsertError),
    /// The channel to a shard's write thread has closed (this is fatal for the table).
    SendChannelClosed,
    /// Failed to receive a response, the shard is in an unknown state.
    ReceiveFailed,
}

impl Error for SyncError {}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PreviousInsertFailed(err) => write!(f, "insert failed: {}", err),
            Self::SendChannelClosed => write!(f, "send channel closed"),
            Self::ReceiveFailed => write!(f, "receive failed"),
        }
    }
}

impl From<InsertError> for SyncError {
    fn from(err: InsertError) -> Self {
        Self::PreviousInsertFailed(err)
    }
}

/// Error from a get with a deadline or a cancel signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetError {
    /// The deadline passed before the lookup finished.
    Timeout,
    /// The cancel signal was raised.
    Cancelled,
}

impl Error for GetError {}

impl fmt::Display for GetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Error from dumping the shards to files.
#[derive(Debug)]
pub enum DumpError {
    /// Committing the write cache failed.
    Sync(SyncError),
    /// Writing a shard image failed.
    IO(io::Error),
}

impl Error for DumpError {}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Sync(e) => write!(f, "sync: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<SyncError> for DumpError {
    fn from(err: SyncError) -> Self {
        Self::Sync(err)
    }
}

impl From<io::Error> for DumpError {
    fn from(err: io::Error) -> Self {
        Self::IO(err)
    }
}
