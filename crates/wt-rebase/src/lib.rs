//! Rebase and histedit: replays a range of commits onto a new base, one at
//! a time, through the same merge and commit machinery a normal work tree
//! uses. A run is journaled through a handful of refs under `refs/wt/<uuid>/`
//! (see [`wt_worktree::derived_refs`]) plus, for histedit, a script file in
//! the work tree's dot-directory — so a conflict can stop the process
//! entirely and a later call picks the run back up without redoing anything
//! already resolved.

mod histedit;
mod prepare;
mod replay;
mod run;
mod treediff;

pub use histedit::{HisteditOp, HisteditScript};
pub use prepare::{abort, complete, prepare, prepare_histedit};
pub use run::{run_histedit, run_linear, replay_one, HisteditPause, StepOutcome};
pub use treediff::diff_trees;
