use std::{fmt, path::PathBuf};

/// The store operation an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    LoadMonthly,
    SaveMonthly,
    LoadDaily,
    SaveDaily,
    LoadIndex,
    SaveIndex,
    ListDevices,
    ListMonths,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LoadMonthly => "load monthly",
            Self::SaveMonthly => "save monthly",
            Self::LoadDaily => "load daily",
            Self::SaveDaily => "save daily",
            Self::LoadIndex => "load device index",
            Self::SaveIndex => "save device index",
            Self::ListDevices => "list devices",
            Self::ListMonths => "list months",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{op}: i/o error on {}: {source}", path.display())]
    Io {
        op: StoreOp,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{op}: malformed JSON in {}: {source}", path.display())]
    Malformed {
        op: StoreOp,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{op}: failed to encode {}: {source}", path.display())]
    Encode {
        op: StoreOp,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid {kind} '{value}'")]
    InvalidKey { kind: &'static str, value: String },
}

impl StoreError {
    /// Whether retrying the same operation could succeed.
    ///
    /// Only raw I/O failures qualify; corrupt files and bad keys fail the same
    /// way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
