use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::error;
use thiserror::Error;

/// What went wrong with the object/part named in a [`Problem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemResult {
    AlreadyExists,
    BadMagic,
    Unreadable,
    Missing,
    Inconsistent,
    Corrupt,
    Incomplete,
    OutOfOrder,
    TruncatedStream,
    HashMismatch,
    BadPath,
    WrongType,
}

impl fmt::Display for ProblemResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemResult::AlreadyExists => write!(f, "already-exists"),
            ProblemResult::BadMagic => write!(f, "bad-magic"),
            ProblemResult::Unreadable => write!(f, "unreadable"),
            ProblemResult::Missing => write!(f, "missing"),
            ProblemResult::Inconsistent => write!(f, "inconsistent"),
            ProblemResult::Corrupt => write!(f, "corrupt"),
            ProblemResult::Incomplete => write!(f, "incomplete"),
            ProblemResult::OutOfOrder => write!(f, "out-of-order"),
            ProblemResult::TruncatedStream => write!(f, "truncated-stream"),
            ProblemResult::HashMismatch => write!(f, "hash-mismatch"),
            ProblemResult::BadPath => write!(f, "bad-path"),
            ProblemResult::WrongType => write!(f, "wrong-type"),
        }
    }
}

/// An integrity problem with some part of an archive.
///
/// `object` names the structure (`archive`, `band`, `block`, ...), `part` the
/// piece of it that was being handled (`head`, `tail`, `index`, `data`, ...).
/// Together with `result` they make up the short form, for example
/// `archive.head.bad-magic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub object: &'static str,
    pub part: &'static str,
    pub result: ProblemResult,
    pub path: Option<PathBuf>,
    pub os_error: Option<String>,
}

impl Problem {
    pub fn new(object: &'static str, part: &'static str, result: ProblemResult) -> Self {
        Problem {
            object,
            part,
            result,
            path: None,
            os_error: None,
        }
    }

    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn os_error<S: ToString>(mut self, os_error: S) -> Self {
        self.os_error = Some(os_error.to_string());
        self
    }

    /// Returns a string like "archive.head.unreadable"
    pub fn shortform(&self) -> String {
        format!("{}.{}.{}", self.object, self.part, self.result)
    }

    pub fn log(&self) {
        error!("Problem: {}", self);
    }

    /// Logs the problem and hands it back as an error for the caller to propagate.
    pub fn signal<T>(self) -> Result<T> {
        self.log();
        Err(Error::Problem(self))
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.shortform())?;
        if let Some(path) = &self.path {
            write!(f, ": {}", path.display())?;
        }
        if let Some(os_error) = &self.os_error {
            write!(f, ": {}", os_error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Problem {}

#[derive(Error, Debug)]
pub enum Error {
    #[error("problem: {0}")]
    Problem(#[from] Problem),
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn io<P: AsRef<Path>>(path: P, source: io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn problem(&self) -> Option<&Problem> {
        match self {
            Error::Problem(p) => Some(p),
            Error::Io { .. } => None,
        }
    }

    /// The problem result if this is a structured problem
    pub fn result(&self) -> Option<ProblemResult> {
        self.problem().map(|p| p.result)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attach a path to a bare `io::Error`.
pub trait IoContext<T> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, io::Error> {
    fn with_path<P: AsRef<Path>>(self, path: P) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
