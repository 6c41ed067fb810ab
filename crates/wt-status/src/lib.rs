//! Status engine (C4) and tree diff driver (C5): the two read-only
//! collaborators that classify and compare paths, consumed by checkout,
//! commit, and the stage/unstage pipelines built on top of them.

mod error;
mod status;
mod treediff;

pub use error::StatusError;
pub use status::{classify, StatusCode};
pub use treediff::{diff_index_tree, TreeDiffCallbacks};
