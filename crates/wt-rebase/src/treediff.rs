//! Tree-vs-tree diff: the set of paths that differ between two commits'
//! trees, used to find what a replayed commit changed relative to its
//! parent.
//!
//! The status engine's [`wt_status::treediff`] compares an index against one
//! tree; this compares two trees directly, which is what rebase/histedit
//! need to isolate a single commit's contribution before merging it.

use std::collections::BTreeSet;

use bstr::{BStr, BString};
use wt_hash::ObjectId;
use wt_meta::WorktreeError;
use wt_object::TreeEntry;
use wt_odb::ObjectStore;

fn join_path(prefix: &BStr, name: &BStr) -> BString {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        let mut p = prefix.to_owned();
        p.push(b'/');
        p.extend_from_slice(name);
        p
    }
}

/// Appends `(repo_path, old_entry, new_entry)` triples for every path whose
/// entry differs between the two trees, recursing into subtrees that
/// changed and descending fully into one side when the other is absent.
pub fn diff_trees<S: ObjectStore>(
    odb: &S,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
    prefix: &BStr,
    out: &mut Vec<(BString, Option<TreeEntry>, Option<TreeEntry>)>,
) -> Result<(), WorktreeError> {
    if old == new {
        return Ok(());
    }

    let old_entries: Vec<TreeEntry> = match old {
        Some(id) => odb.open_as_tree(&id)?.entries,
        None => Vec::new(),
    };
    let new_entries: Vec<TreeEntry> = match new {
        Some(id) => odb.open_as_tree(&id)?.entries,
        None => Vec::new(),
    };

    let mut names: BTreeSet<BString> = BTreeSet::new();
    names.extend(old_entries.iter().map(|e| e.name.clone()));
    names.extend(new_entries.iter().map(|e| e.name.clone()));

    for name in names {
        let old_e = old_entries.iter().find(|e| e.name == name);
        let new_e = new_entries.iter().find(|e| e.name == name);

        if old_e.map(|e| (&e.oid, e.mode)) == new_e.map(|e| (&e.oid, e.mode)) {
            continue;
        }

        let path = join_path(prefix, name.as_bstr());

        match (old_e, new_e) {
            (Some(o), Some(n)) if o.mode.is_tree() && n.mode.is_tree() => {
                diff_trees(odb, Some(o.oid), Some(n.oid), path.as_bstr(), out)?;
            }
            (Some(o), Some(n)) if o.mode.is_tree() => {
                diff_trees(odb, Some(o.oid), None, path.as_bstr(), out)?;
                out.push((path, None, Some(n.clone())));
            }
            (Some(o), Some(n)) if n.mode.is_tree() => {
                out.push((path.clone(), Some(o.clone()), None));
                diff_trees(odb, None, Some(n.oid), path.as_bstr(), out)?;
            }
            (Some(o), Some(n)) => {
                out.push((path, Some(o.clone()), Some(n.clone())));
            }
            (Some(o), None) => {
                if o.mode.is_tree() {
                    diff_trees(odb, Some(o.oid), None, path.as_bstr(), out)?;
                } else {
                    out.push((path, Some(o.clone()), None));
                }
            }
            (None, Some(n)) => {
                if n.mode.is_tree() {
                    diff_trees(odb, None, Some(n.oid), path.as_bstr(), out)?;
                } else {
                    out.push((path, None, Some(n.clone())));
                }
            }
            (None, None) => unreachable!("name came from one of the two entry lists"),
        }
    }

    Ok(())
}
