use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index file is corrupt: {0}")]
    Corrupt(String),

    #[error("unsupported index format version: {0}")]
    UnsupportedVersion(u32),

    #[error("duplicate index entry for path {0:?}")]
    DuplicatePath(String),

    #[error("lock failed: {path}")]
    LockFailed { path: PathBuf },

    #[error(transparent)]
    Hash(#[from] wt_hash::HashError),

    #[error(transparent)]
    Util(#[from] wt_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
