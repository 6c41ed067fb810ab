//! Ancestry queries over the commit graph.
//!
//! The rebase and histedit state machines need to know whether one commit
//! is reachable from another (to validate resumed journals and to order
//! replayed commits). This is a plain breadth-first walk of parent links,
//! not the fuller paint/merge-base machinery a log viewer would need.

use std::collections::{HashSet, VecDeque};

use wt_hash::ObjectId;

use crate::{ObjectStore, OdbError};

/// Is `ancestor` reachable from `descendant` by following parent links?
/// A commit is considered its own ancestor.
pub fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, OdbError> {
    if ancestor == descendant {
        return Ok(true);
    }

    let mut seen: HashSet<ObjectId> = HashSet::new();
    let mut queue: VecDeque<ObjectId> = VecDeque::new();
    queue.push_back(*descendant);
    seen.insert(*descendant);

    while let Some(oid) = queue.pop_front() {
        let commit = store.open_as_commit(&oid)?;
        for parent in &commit.parents {
            if parent == ancestor {
                return Ok(true);
            }
            if seen.insert(*parent) {
                queue.push_back(*parent);
            }
        }
    }

    Ok(false)
}

/// Walk the first-parent chain from `head` back to (and including) `base`,
/// returning commits oldest-first. Used by rebase to enumerate the linear
/// run of source commits being replayed.
pub fn linear_history(
    store: &dyn ObjectStore,
    head: &ObjectId,
    base: &ObjectId,
) -> Result<Vec<ObjectId>, OdbError> {
    let mut chain = Vec::new();
    let mut current = *head;
    loop {
        if current == *base {
            break;
        }
        chain.push(current);
        let commit = store.open_as_commit(&current)?;
        current = match commit.parents.first() {
            Some(p) => *p,
            None => break,
        };
    }
    chain.reverse();
    Ok(chain)
}
