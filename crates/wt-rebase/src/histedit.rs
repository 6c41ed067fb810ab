//! The histedit script: one `<op> <commit> [message]` line per source
//! commit, plus standalone `mesg <text>` lines rewording the log message of
//! the commit that was just landed.

use bstr::BString;
use wt_hash::ObjectId;
use wt_meta::{WorkTree, WorktreeError};

const CONTROL_FILE: &str = "histedit-script";

/// One parsed line of a histedit script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HisteditOp {
    /// Replay the commit as-is.
    Pick(ObjectId),
    /// Replay the commit, then stop so the caller can amend it.
    Edit(ObjectId),
    /// Skip the commit entirely.
    Drop(ObjectId),
    /// Replay the commit but fold it into the next non-fold commit instead
    /// of landing it on its own.
    Fold(ObjectId),
    /// Rewords the commit just landed (must follow an `edit` or the landing
    /// `pick` that closes a fold group).
    Mesg(BString),
}

impl HisteditOp {
    fn commit_id(&self) -> Option<ObjectId> {
        match self {
            Self::Pick(id) | Self::Edit(id) | Self::Drop(id) | Self::Fold(id) => Some(*id),
            Self::Mesg(_) => None,
        }
    }
}

/// A histedit script: the user's edited plan for a commit range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HisteditScript {
    pub ops: Vec<HisteditOp>,
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace()).map(|i| i + 1).unwrap_or(start);
    &bytes[start..end]
}

fn split_once(bytes: &[u8], sep: u8) -> (&[u8], Option<&[u8]>) {
    match bytes.iter().position(|&b| b == sep) {
        Some(idx) => (&bytes[..idx], Some(&bytes[idx + 1..])),
        None => (bytes, None),
    }
}

fn parse_oid(bytes: &[u8]) -> Result<ObjectId, WorktreeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| WorktreeError::HistEditCommitId(String::from_utf8_lossy(bytes).into_owned()))?;
    ObjectId::from_hex(text).map_err(|_| WorktreeError::HistEditCommitId(text.to_owned()))
}

impl HisteditScript {
    /// Parses a script, one `<op> <id-or-text>` per line. Blank lines and
    /// lines starting with `#` are ignored.
    pub fn parse(content: &[u8]) -> Result<Self, WorktreeError> {
        let mut ops = Vec::new();

        for raw_line in content.split(|&b| b == b'\n') {
            let line = trim(raw_line);
            if line.is_empty() || line[0] == b'#' {
                continue;
            }

            let (op, rest) = split_once(line, b' ');
            let rest = trim(rest.unwrap_or(b""));

            let parsed = match op {
                b"pick" => HisteditOp::Pick(parse_oid(rest)?),
                b"edit" => HisteditOp::Edit(parse_oid(rest)?),
                b"drop" => HisteditOp::Drop(parse_oid(rest)?),
                b"fold" => HisteditOp::Fold(parse_oid(rest)?),
                b"mesg" => HisteditOp::Mesg(BString::from(rest)),
                other => {
                    return Err(WorktreeError::HistEditCommitId(
                        String::from_utf8_lossy(other).into_owned(),
                    ))
                }
            };
            ops.push(parsed);
        }

        Ok(Self { ops })
    }

    /// Renders the script back to its on-disk text form.
    pub fn render(&self) -> BString {
        let mut out = BString::from("");
        for op in &self.ops {
            match op {
                HisteditOp::Pick(id) => out.extend_from_slice(format!("pick {}\n", id.to_hex()).as_bytes()),
                HisteditOp::Edit(id) => out.extend_from_slice(format!("edit {}\n", id.to_hex()).as_bytes()),
                HisteditOp::Drop(id) => out.extend_from_slice(format!("drop {}\n", id.to_hex()).as_bytes()),
                HisteditOp::Fold(id) => out.extend_from_slice(format!("fold {}\n", id.to_hex()).as_bytes()),
                HisteditOp::Mesg(text) => {
                    out.extend_from_slice(b"mesg ");
                    out.extend_from_slice(text);
                    out.push(b'\n');
                }
            }
        }
        out
    }

    /// Validates the script against the linear source history it was
    /// generated from: every non-dropped commit must appear exactly once,
    /// the last line must not be a `fold`, and every `mesg` must follow an
    /// `edit` or the last pick/edit/fold of a fold group.
    pub fn validate(&self, source_history: &[ObjectId]) -> Result<(), WorktreeError> {
        if matches!(self.ops.last(), Some(HisteditOp::Fold(_))) {
            return Err(WorktreeError::FoldLast);
        }

        for &expected in source_history {
            let present = self
                .ops
                .iter()
                .any(|op| op.commit_id() == Some(expected));
            if !present {
                return Err(WorktreeError::MissingCommit(expected.to_hex()));
            }
        }

        let mut last_landing_op: Option<&HisteditOp> = None;
        for op in &self.ops {
            if let HisteditOp::Mesg(_) = op {
                let follows_edit_or_fold_end = matches!(
                    last_landing_op,
                    Some(HisteditOp::Edit(_)) | Some(HisteditOp::Pick(_))
                );
                if !follows_edit_or_fold_end {
                    return Err(WorktreeError::HistEditCommitId(
                        "mesg must follow an edit or a landing commit".into(),
                    ));
                }
            } else {
                last_landing_op = Some(op);
            }
        }

        Ok(())
    }
}

/// Persists the remaining script to the work tree's control file. The
/// driver in [`crate::run`] rewrites this after every step it completes, so
/// a crash or a conflict leaves exactly the unprocessed tail behind for
/// [`read_script`] to pick back up.
pub fn write_script(worktree: &WorkTree, script: &HisteditScript) -> Result<(), WorktreeError> {
    std::fs::write(worktree.dotdir().join(CONTROL_FILE), script.render())?;
    Ok(())
}

/// Reads the in-progress script back from the work tree's control file.
pub fn read_script(worktree: &WorkTree) -> Result<HisteditScript, WorktreeError> {
    let bytes = std::fs::read(worktree.dotdir().join(CONTROL_FILE))?;
    HisteditScript::parse(&bytes)
}

/// Removes the control file. Called once a histedit run completes or is
/// aborted.
pub fn clear_script(worktree: &WorkTree) -> Result<(), WorktreeError> {
    match std::fs::remove_file(worktree.dotdir().join(CONTROL_FILE)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_hash::HashAlgorithm;

    fn oid(n: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        ObjectId::from_bytes(&bytes, HashAlgorithm::Sha1).unwrap()
    }

    #[test]
    fn parses_every_op_kind() {
        let a = oid(1);
        let b = oid(2);
        let c = oid(3);
        let d = oid(4);
        let content = format!(
            "pick {}\nedit {}\ndrop {}\nfold {}\nmesg new message\n",
            a.to_hex(),
            b.to_hex(),
            c.to_hex(),
            d.to_hex(),
        );
        let script = HisteditScript::parse(content.as_bytes()).unwrap();
        assert_eq!(
            script.ops,
            vec![
                HisteditOp::Pick(a),
                HisteditOp::Edit(b),
                HisteditOp::Drop(c),
                HisteditOp::Fold(d),
                HisteditOp::Mesg("new message".into()),
            ]
        );
    }

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        let a = oid(1);
        let content = format!("# plan\n\npick {}\n\n", a.to_hex());
        let script = HisteditScript::parse(content.as_bytes()).unwrap();
        assert_eq!(script.ops, vec![HisteditOp::Pick(a)]);
    }

    #[test]
    fn validate_rejects_a_missing_commit() {
        let a = oid(1);
        let b = oid(2);
        let script = HisteditScript { ops: vec![HisteditOp::Pick(a)] };
        assert!(matches!(
            script.validate(&[a, b]),
            Err(WorktreeError::MissingCommit(_))
        ));
    }

    #[test]
    fn validate_rejects_fold_as_last_line() {
        let a = oid(1);
        let script = HisteditScript { ops: vec![HisteditOp::Fold(a)] };
        assert!(matches!(script.validate(&[a]), Err(WorktreeError::FoldLast)));
    }

    #[test]
    fn validate_accepts_a_well_formed_script() {
        let a = oid(1);
        let b = oid(2);
        let script = HisteditScript {
            ops: vec![HisteditOp::Pick(a), HisteditOp::Edit(b), HisteditOp::Mesg("edited".into())],
        };
        assert!(script.validate(&[a, b]).is_ok());
    }

    #[test]
    fn control_file_round_trips_through_the_worktree_dotdir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("wt");
        std::fs::create_dir_all(&root).unwrap();
        let worktree = wt_meta::WorkTree::init(
            &root,
            wt_meta::HeadRef::Branch(wt_ref::RefName::new("refs/heads/main").unwrap()),
            "/",
            tmp.path().join("repo"),
            HashAlgorithm::Sha1,
        )
        .unwrap();

        let a = oid(1);
        let script = HisteditScript { ops: vec![HisteditOp::Pick(a)] };
        write_script(&worktree, &script).unwrap();

        let read_back = read_script(&worktree).unwrap();
        assert_eq!(read_back, script);

        clear_script(&worktree).unwrap();
        assert!(read_script(&worktree).is_err());
    }
}
