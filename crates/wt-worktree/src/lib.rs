//! Checkout/update and commit: the orchestration layer that drives the
//! index, status engine, merger, object store, and ref store together to
//! realise a work tree's base commit on disk and turn its changes back into
//! commits.

mod checkout;
mod commit;
mod commitable;
pub mod derived_refs;

pub use checkout::checkout_files;
pub use commit::commit;
pub use commitable::Commitable;
