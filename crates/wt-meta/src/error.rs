use std::path::PathBuf;

/// The closed set of error kinds an orchestration entry point can return.
///
/// Names are abstract on purpose: callers branch on the variant, never on
/// the formatted message. Variants that belong to a later component
/// (`wt-worktree`, `wt-rebase`, `wt-stage`) are still declared here so every
/// orchestration crate shares one error type at its public boundary, per the
/// collaborator wrapping convention described in the root design notes.
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    #[error("work tree metadata is corrupt: {0}")]
    MetaCorrupt(String),

    #[error("work tree format {found} is not supported (expected {expected})")]
    WrongVersion { found: u32, expected: u32 },

    #[error("work tree is locked by another process")]
    Busy,

    #[error("{0} is not inside a work tree")]
    NotAWorktree(PathBuf),

    #[error("index entries reference more than one base commit")]
    MixedCommits,

    #[error("{0} has unresolved conflicts")]
    Conflicts(String),

    #[error("{0} has local modifications")]
    Modified(String),

    #[error("work tree is out of date with its base commit")]
    OutOfDate,

    #[error("branch head changed concurrently")]
    HeadChanged,

    #[error("nothing to commit")]
    NoChanges,

    #[error("commit message is empty")]
    MsgEmpty,

    #[error("{0} is not a valid path for this operation")]
    BadPath(String),

    #[error("{0}: unexpected file status")]
    FileStatus(String),

    #[error("{0} is staged")]
    FileStaged(String),

    #[error("{0} is not staged")]
    NotStaged(String),

    #[error("{0} has a staging conflict")]
    StageConflict(String),

    #[error("no such path in tree: {0}")]
    NoTreeEntry(String),

    #[error("{0} is obstructed by a non-regular file")]
    Obstructed(PathBuf),

    #[error("{0} was modified during the operation")]
    FileModified(PathBuf),

    #[error("{0} has an unsafe symlink target")]
    BadSymlink(PathBuf),

    #[error("operation cancelled")]
    Cancelled,

    #[error("commit {0} is missing from the histedit script")]
    MissingCommit(String),

    #[error("last commit in histedit script cannot be folded")]
    FoldLast,

    #[error("unexpected commit id encountered during rebase: {0}")]
    RebaseCommitId(String),

    #[error("unexpected commit id encountered during histedit: {0}")]
    HistEditCommitId(String),

    #[error("invalid patch hunk choice")]
    PatchChoice,

    #[error(transparent)]
    Ref(#[from] wt_ref::RefError),

    #[error(transparent)]
    Odb(#[from] wt_odb::OdbError),

    #[error(transparent)]
    Index(#[from] wt_index::IndexError),

    #[error(transparent)]
    Merge(#[from] wt_merge::MergeError),

    #[error(transparent)]
    Util(#[from] wt_utils::UtilError),

    #[error(transparent)]
    Hash(#[from] wt_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
