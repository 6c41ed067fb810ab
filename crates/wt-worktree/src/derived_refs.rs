//! Well-known repository ref names derived from a work tree's uuid.
//!
//! These protect state that would otherwise be invisible to the repository
//! (a base commit pinned only by a work tree's metadata, an in-progress
//! rebase/histedit's linearised commits) from garbage collection, and give
//! a crashed operation somewhere to resume from.

use uuid::Uuid;
use wt_ref::RefName;

fn derived(uuid: Uuid, leaf: &str) -> RefName {
    RefName::new(format!("refs/wt/{uuid}/{leaf}")).expect("derived ref names are always well-formed")
}

/// Pins the work tree's base commit against garbage collection.
pub fn base_commit_ref(uuid: Uuid) -> RefName {
    derived(uuid, "base-commit")
}

/// Mutable branch receiving replayed commits during rebase/histedit.
pub fn tmp_branch(uuid: Uuid) -> RefName {
    derived(uuid, "tmp-branch")
}

/// Symbolic ref to the branch the rewrite will land on.
pub fn newbase_symref(uuid: Uuid) -> RefName {
    derived(uuid, "newbase")
}

/// Symbolic ref to the branch being rewritten.
pub fn branch_symref(uuid: Uuid) -> RefName {
    derived(uuid, "branch")
}

/// Current source commit being replayed.
pub fn commit_ref(uuid: Uuid) -> RefName {
    derived(uuid, "commit")
}
