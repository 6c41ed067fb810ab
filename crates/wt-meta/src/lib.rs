//! The metadata store: a work tree's dot-directory of control files, plus
//! the path utilities (child/ancestor tests, canonicalization, symlink
//! safety) that every other work-tree component builds on.
//!
//! A work tree is identified by an absolute filesystem path whose immediate
//! dot-directory holds a handful of small control files (format, uuid,
//! repository, path-prefix, head-ref, base-commit) plus the file index and
//! the advisory lock file. This crate owns that layout end to end: creating
//! it (`init`), reading it back (`open`), and atomically rewriting the two
//! files that change during normal operation (`set_head_ref`,
//! `set_base_commit`).

mod error;
mod lock;
pub mod path;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use wt_hash::{HashAlgorithm, ObjectId};
use wt_ref::RefName;
use wt_utils::lockfile::LockFile;

pub use error::WorktreeError;
pub use lock::{LockMode, WorkTreeLock};

/// Name of the dot-directory created under a work tree's root.
pub const DOT_DIR_NAME: &str = ".wt";

/// On-disk layout version this crate reads and writes.
pub const FORMAT_VERSION: u32 = 1;

const FILE_FORMAT: &str = "format";
const FILE_UUID: &str = "uuid";
const FILE_REPOSITORY: &str = "repository";
const FILE_PATH_PREFIX: &str = "path-prefix";
const FILE_HEAD_REF: &str = "head-ref";
const FILE_BASE_COMMIT: &str = "base-commit";
const FILE_LOCK: &str = "lock";

/// What the work tree's `head-ref` file points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadRef {
    /// Tracking a named branch (or other ref) by name.
    Branch(RefName),
    /// Detached at a specific commit.
    Detached(ObjectId),
}

impl HeadRef {
    fn parse(s: &str, algo: HashAlgorithm) -> Result<Self, WorktreeError> {
        if s.len() == algo.hex_len() {
            if let Ok(id) = ObjectId::from_hex(s) {
                return Ok(Self::Detached(id));
            }
        }
        Ok(Self::Branch(RefName::new(s)?))
    }

    fn render(&self) -> String {
        match self {
            Self::Branch(name) => name.to_string(),
            Self::Detached(id) => id.to_hex(),
        }
    }
}

/// A validated, open work tree.
pub struct WorkTree {
    root: PathBuf,
    dotdir: PathBuf,
    uuid: uuid::Uuid,
    repository: PathBuf,
    path_prefix: BString,
    head_ref: HeadRef,
    base_commit: ObjectId,
    hash_algo: HashAlgorithm,
}

impl WorkTree {
    /// Create a new work tree's dot-directory at `root`.
    ///
    /// Fails if `root` is already a work tree (every control file is
    /// created exactly once; a pre-existing `format` file means this is a
    /// double-init).
    pub fn init(
        root: impl AsRef<Path>,
        head_ref: HeadRef,
        path_prefix: impl Into<BString>,
        repository: impl Into<PathBuf>,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, WorktreeError> {
        let root = fs::canonicalize(root.as_ref())?;
        let dotdir = root.join(DOT_DIR_NAME);
        if dotdir.join(FILE_FORMAT).exists() {
            return Err(WorktreeError::MetaCorrupt(format!(
                "{} is already a work tree",
                root.display()
            )));
        }
        fs::create_dir_all(&dotdir)?;

        let repository = repository.into();
        let path_prefix: BString = path_prefix.into();
        let uuid = uuid::Uuid::new_v4();
        let base_commit = hash_algo.null_oid();

        write_initial(&dotdir, FILE_FORMAT, &FORMAT_VERSION.to_string())?;
        write_initial(&dotdir, FILE_UUID, &uuid.to_string())?;
        write_initial(&dotdir, FILE_REPOSITORY, &repository.display().to_string())?;
        write_initial(&dotdir, FILE_PATH_PREFIX, path_prefix.to_str_lossy().as_ref())?;
        write_initial(&dotdir, FILE_HEAD_REF, &head_ref.render())?;
        write_initial(&dotdir, FILE_BASE_COMMIT, &base_commit.to_hex())?;
        write_initial(&dotdir, FILE_LOCK, "")?;

        Ok(Self {
            root,
            dotdir,
            uuid,
            repository,
            path_prefix,
            head_ref,
            base_commit,
            hash_algo,
        })
    }

    /// Open an existing work tree rooted exactly at `root` (no upward
    /// search; callers that need to find the enclosing work tree from an
    /// arbitrary subdirectory do so before calling this).
    pub fn open(root: impl AsRef<Path>) -> Result<Self, WorktreeError> {
        let root = fs::canonicalize(root.as_ref())?;
        let dotdir = root.join(DOT_DIR_NAME);
        if !dotdir.is_dir() {
            return Err(WorktreeError::NotAWorktree(root));
        }

        let format: u32 = read_meta_file(&dotdir, FILE_FORMAT)?
            .parse()
            .map_err(|_| WorktreeError::MetaCorrupt(format!("{FILE_FORMAT} is not an integer")))?;
        if format != FORMAT_VERSION {
            return Err(WorktreeError::WrongVersion {
                found: format,
                expected: FORMAT_VERSION,
            });
        }

        let uuid_str = read_meta_file(&dotdir, FILE_UUID)?;
        let uuid = uuid::Uuid::parse_str(&uuid_str)
            .map_err(|_| WorktreeError::MetaCorrupt(format!("{FILE_UUID} is not a valid uuid")))?;

        let repository = PathBuf::from(read_meta_file(&dotdir, FILE_REPOSITORY)?);
        let path_prefix = BString::from(read_meta_file(&dotdir, FILE_PATH_PREFIX)?);

        let base_commit_str = read_meta_file(&dotdir, FILE_BASE_COMMIT)?;
        let base_commit = ObjectId::from_hex(&base_commit_str)
            .map_err(|_| WorktreeError::MetaCorrupt(format!("{FILE_BASE_COMMIT} is not a valid object id")))?;
        let hash_algo = base_commit.algorithm();

        let head_ref_str = read_meta_file(&dotdir, FILE_HEAD_REF)?;
        let head_ref = HeadRef::parse(&head_ref_str, hash_algo)?;

        Ok(Self {
            root,
            dotdir,
            uuid,
            repository,
            path_prefix,
            head_ref,
            base_commit,
            hash_algo,
        })
    }

    /// Release this handle. A no-op beyond what `Drop` already does; exists
    /// so callers have an explicit point to release the work tree at,
    /// mirroring the `open`/`close` pairing.
    pub fn close(self) {}

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dotdir(&self) -> &Path {
        &self.dotdir
    }

    pub fn uuid(&self) -> uuid::Uuid {
        self.uuid
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    pub fn path_prefix(&self) -> &BStr {
        self.path_prefix.as_bstr()
    }

    pub fn head_ref(&self) -> &HeadRef {
        &self.head_ref
    }

    pub fn base_commit(&self) -> ObjectId {
        self.base_commit
    }

    pub fn hash_algo(&self) -> HashAlgorithm {
        self.hash_algo
    }

    /// Atomically rewrite the `head-ref` control file and update the
    /// in-memory value.
    pub fn set_head_ref(&mut self, head_ref: HeadRef) -> Result<(), WorktreeError> {
        write_atomic(&self.dotdir, FILE_HEAD_REF, &head_ref.render())?;
        self.head_ref = head_ref;
        Ok(())
    }

    /// Atomically rewrite the `base-commit` control file and update the
    /// in-memory value.
    pub fn set_base_commit(&mut self, base_commit: ObjectId) -> Result<(), WorktreeError> {
        write_atomic(&self.dotdir, FILE_BASE_COMMIT, &base_commit.to_hex())?;
        self.base_commit = base_commit;
        Ok(())
    }

    /// Acquire the work-tree-wide advisory lock, non-blocking.
    pub fn lock(&self, mode: LockMode) -> Result<WorkTreeLock, WorktreeError> {
        WorkTreeLock::acquire(self.dotdir.join(FILE_LOCK), mode)
    }

    /// True if `target` (the raw bytes a symlink at `ondisk_path` would be
    /// installed with) would escape this work tree or land inside its dot
    /// directory. Intended to be passed as `wt_merge::install_symlink`'s
    /// `is_bad_target` closure, e.g. `|t| wt.is_bad_symlink_target(t, &p)`.
    pub fn is_bad_symlink_target(&self, target: &[u8], ondisk_path: &Path) -> bool {
        path::is_bad_symlink_target(target, ondisk_path, &self.root, DOT_DIR_NAME)
    }
}

fn write_initial(dotdir: &Path, name: &str, content: &str) -> Result<(), WorktreeError> {
    let mut file = fs::File::create(dotdir.join(name))?;
    writeln!(file, "{content}")?;
    file.sync_all()?;
    Ok(())
}

fn write_atomic(dotdir: &Path, name: &str, content: &str) -> Result<(), WorktreeError> {
    let path = dotdir.join(name);
    let mut lock = LockFile::acquire(&path)?;
    writeln!(lock, "{content}")?;
    lock.commit()?;
    Ok(())
}

fn read_meta_file(dotdir: &Path, name: &str) -> Result<String, WorktreeError> {
    let path = dotdir.join(name);
    let raw = fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WorktreeError::MetaCorrupt(format!("missing control file {name}"))
        } else {
            WorktreeError::Io(e)
        }
    })?;
    let trimmed = raw.strip_suffix('\n').ok_or_else(|| {
        WorktreeError::MetaCorrupt(format!("{name} is truncated (no trailing newline)"))
    })?;
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_worktree(root: &Path) -> WorkTree {
        WorkTree::init(
            root,
            HeadRef::Branch(RefName::new("refs/heads/main").unwrap()),
            BString::from("/"),
            PathBuf::from("/repo.git"),
            HashAlgorithm::Sha1,
        )
        .unwrap()
    }

    #[test]
    fn init_then_open_round_trips_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let wt = init_worktree(dir.path());
        let uuid = wt.uuid();
        let base = wt.base_commit();
        wt.close();

        let reopened = WorkTree::open(dir.path()).unwrap();
        assert_eq!(reopened.uuid(), uuid);
        assert_eq!(reopened.repository(), Path::new("/repo.git"));
        assert_eq!(reopened.path_prefix(), "/");
        assert_eq!(reopened.base_commit(), base);
        assert!(reopened.base_commit().is_null());
        assert_eq!(
            reopened.head_ref(),
            &HeadRef::Branch(RefName::new("refs/heads/main").unwrap())
        );
    }

    #[test]
    fn double_init_fails() {
        let dir = tempfile::tempdir().unwrap();
        init_worktree(dir.path());
        let err = WorkTree::init(
            dir.path(),
            HeadRef::Branch(RefName::new("refs/heads/main").unwrap()),
            BString::from("/"),
            PathBuf::from("/repo.git"),
            HashAlgorithm::Sha1,
        )
        .unwrap_err();
        assert!(matches!(err, WorktreeError::MetaCorrupt(_)));
    }

    #[test]
    fn open_missing_worktree_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = WorkTree::open(dir.path()).unwrap_err();
        assert!(matches!(err, WorktreeError::NotAWorktree(_)));
    }

    #[test]
    fn set_head_ref_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut wt = init_worktree(dir.path());
        wt.set_head_ref(HeadRef::Branch(RefName::new("refs/heads/topic").unwrap()))
            .unwrap();
        wt.close();

        let reopened = WorkTree::open(dir.path()).unwrap();
        assert_eq!(
            reopened.head_ref(),
            &HeadRef::Branch(RefName::new("refs/heads/topic").unwrap())
        );
    }

    #[test]
    fn set_base_commit_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut wt = init_worktree(dir.path());
        let new_base = ObjectId::from_hex("a".repeat(40).as_str()).unwrap();
        wt.set_base_commit(new_base).unwrap();
        wt.close();

        let reopened = WorkTree::open(dir.path()).unwrap();
        assert_eq!(reopened.base_commit(), new_base);
    }

    #[test]
    fn detached_head_ref_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut wt = init_worktree(dir.path());
        let id = ObjectId::from_hex("b".repeat(40).as_str()).unwrap();
        wt.set_head_ref(HeadRef::Detached(id)).unwrap();
        wt.close();

        let reopened = WorkTree::open(dir.path()).unwrap();
        assert_eq!(reopened.head_ref(), &HeadRef::Detached(id));
    }

    #[test]
    fn lock_is_exclusive_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let wt = init_worktree(dir.path());
        let _first = wt.lock(LockMode::Exclusive).unwrap();
        let err = wt.lock(LockMode::Exclusive).unwrap_err();
        assert!(matches!(err, WorktreeError::Busy));
    }

    #[test]
    fn is_bad_symlink_target_delegates_to_path_module() {
        let dir = tempfile::tempdir().unwrap();
        let wt = init_worktree(dir.path());
        let ondisk = wt.root().join("link");
        assert!(wt.is_bad_symlink_target(b"/etc/passwd", &ondisk));
        assert!(!wt.is_bad_symlink_target(b"sibling.txt", &ondisk));
    }
}
