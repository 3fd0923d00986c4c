//! Implements the errors for the hash tables, iterators and pack codec.

pub mod codec;
pub mod insert;
pub mod rehash;

use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;
use std::io;

/// Build an ErrorInfo.  Needs to be a macro to capture the file and line/column information.
#[macro_export]
macro_rules! err_info {
    () => {{
        $crate::error::ErrorInfo::new(
            file!(),
            line!(),
            column!(),
            std::backtrace::Backtrace::capture(),
        )
    }};
}

/// Container for common error information.
#[derive(Debug)]
pub struct ErrorInfo {
    file: &'static str,
    line: u32,
    column: u32,
    backtrace: Backtrace,
}

impl ErrorInfo {
    /// Construct a new ErrorInfo.
    pub fn new(file: &'static str, line: u32, column: u32, backtrace: Backtrace) -> Self {
        Self {
            file,
            line,
            column,
            backtrace,
        }
    }

    /// Return the file name in which this error was generated.
    pub fn file(&self) -> &str {
        self.file
    }

    /// Line in file where the error was generated.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Column in file where the error was generated.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// If available (env variables set) contain the backtrace for the error.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}: line: {}, col: {}]",
            self.file, self.line, self.column
        )
    }
}

/// Error on loading a table header (from memory or a file).
#[derive(Debug)]
pub enum LoadHeaderError {
    /// The version byte is not one this code understands.
    InvalidVersion(u8),
    /// The header crc32 does not match its contents.
    CrcFailed,
    /// Not enough bytes to hold the header (or the buckets it describes).
    Truncated,
    /// The header fields describe an impossible table (bucket count, hash functions, etc).
    InvalidLayout(&'static str),
    /// An underlying IO error while loading the header.
    IO(io::Error),
}

impl Error for LoadHeaderError {}

impl fmt::Display for LoadHeaderError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::InvalidVersion(v) => write!(f, "invalid version {}", v),
            Self::CrcFailed => write!(f, "crc32 mismatch"),
            Self::Truncated => write!(f, "truncated header"),
            Self::InvalidLayout(msg) => write!(f, "invalid layout: {}", msg),
            Self::IO(e) => write!(f, "io: {}", e),
        }
    }
}

impl From<io::Error> for LoadHeaderError {
    fn from(io_err: io::Error) -> Self {
        Self::IO(io_err)
    }
}

/// Error on mounting a table onto a memory region.
#[derive(Debug)]
pub enum MountError {
    /// The region can not hold the header plus a single block of buckets.
    RegionTooSmall {
        /// Bytes required.
        needed: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// The table configuration is not usable (occupancy, hash function counts).
    InvalidConfig(&'static str),
    /// The region does not contain a valid table header.
    Header(LoadHeaderError),
}

impl Error for MountError {}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::RegionTooSmall { needed, actual } => {
                write!(f, "region too small: need {} bytes, got {}", needed, actual)
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            Self::Header(e) => write!(f, "header: {}", e),
        }
    }
}

impl From<LoadHeaderError> for MountError {
    fn from(err: LoadHeaderError) -> Self {
        Self::Header(err)
    }
}

/// Error reading entries from a persisted table image.
#[derive(Debug)]
pub enum FetchError {
    /// The table header could not be loaded or verified.
    Header(LoadHeaderError),
    /// An IO error reading buckets.
    IO(io::Error),
    /// The file ended before all buckets described by the header were read.
    Truncated,
    /// The operation is not supported by this iterator (sorting a forward only iterator).
    Unsupported(&'static str),
}

impl Error for FetchError {}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            Self::Header(e) => write!(f, "header: {}", e),
            Self::IO(e) => write!(f, "io: {}", e),
            Self::Truncated => write!(f, "truncated bucket data"),
            Self::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

impl From<io::Error> for FetchError {
    fn from(io_err: io::Error) -> Self {
        if io_err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::IO(io_err)
        }
    }
}

impl From<LoadHeaderError> for FetchError {
    fn from(err: LoadHeaderError) -> Self {
        Self::Header(err)
    }
}
