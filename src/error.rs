use std::path::PathBuf;
use thiserror::Error;

use crate::codec::CodecError;
use crate::superblock::SUPERBLOCK_SIZE;

#[derive(Debug, Error)]
pub enum ExeFsError {
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create output directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("header file holds {actual} bytes, a superblock needs {}", SUPERBLOCK_SIZE)]
    HeaderTooShort { actual: u64 },

    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Aggregate per-slot failure: everything that could be produced was,
    /// but at least one output did not come out intact.
    #[error("{failed} of {attempted} output(s) failed")]
    Partial { failed: usize, attempted: usize },
}

pub type Result<T> = std::result::Result<T, ExeFsError>;
