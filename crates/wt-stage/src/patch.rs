//! Hunk reconstruction: rebuilds a file's content from a base buffer plus a
//! per-hunk accept/reject decision, shared by [`crate::stage`]'s interactive
//! path and [`crate::unstage`]'s hunk-level reversal.

use wt_diff::{DiffAlgorithm, DiffLine, Hunk};

/// What the caller's patch callback chose for one hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchDecision {
    Yes,
    No,
    /// Abandon the whole stage/unstage call; nothing done so far is
    /// committed to the index.
    Quit,
}

/// Diff `base` against `updated` at hunk granularity.
///
/// `base` is "what's already recorded" (the staged or base blob); `updated`
/// is "what the operation is moving away from" (the on-disk file for stage,
/// the current staged blob for unstage).
pub fn diff_hunks(base: &[u8], updated: &[u8]) -> Vec<Hunk> {
    wt_diff::algorithm::diff_lines(base, updated, DiffAlgorithm::Myers, 3)
}

/// Reconstruct content by walking `base` and, for each hunk, emitting its
/// "new" side (an addition) when `keep` accepts the hunk and its "old" side
/// (a deletion) otherwise — context is always emitted verbatim. Lines of
/// `base` outside any hunk pass through unchanged.
///
/// `keep` returning `None` signals the caller quit mid-session; reconstruction
/// stops immediately and `None` propagates out so callers can abort cleanly.
pub fn apply_selected_hunks(
    base: &[u8],
    hunks: &[Hunk],
    mut keep: impl FnMut(usize, &Hunk) -> Option<bool>,
) -> Option<Vec<u8>> {
    let base_lines = wt_diff::algorithm::split_lines(base);
    let mut out = Vec::new();
    let mut cursor = 0usize;

    for (i, hunk) in hunks.iter().enumerate() {
        let hunk_old_start = (hunk.old_start as usize).saturating_sub(1);
        while cursor < hunk_old_start && cursor < base_lines.len() {
            out.extend_from_slice(base_lines[cursor]);
            cursor += 1;
        }

        let accept = keep(i, hunk)?;
        for line in &hunk.lines {
            match line {
                DiffLine::Context(text) => {
                    out.extend_from_slice(text);
                    cursor += 1;
                }
                DiffLine::Deletion(text) => {
                    if !accept {
                        out.extend_from_slice(text);
                    }
                    cursor += 1;
                }
                DiffLine::Addition(text) => {
                    if accept {
                        out.extend_from_slice(text);
                    }
                }
            }
        }
    }
    while cursor < base_lines.len() {
        out.extend_from_slice(base_lines[cursor]);
        cursor += 1;
    }

    Some(out)
}

/// Whether hunk-level patching makes sense for this content at all: binary
/// data and symlink targets are always staged/unstaged as a whole, matching
/// [`wt_merge::merge_symlink`]'s own "never runs a line-level diff" stance.
pub fn supports_hunks(content: &[u8], is_symlink: bool) -> bool {
    !is_symlink && !wt_diff::binary::is_binary(content)
}
