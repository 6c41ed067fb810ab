//! Hash computation and object identity for the work-tree engine.
//!
//! This crate provides the core `ObjectId` type, hash computation, hex
//! encoding/decoding, and specialized OID collections used by the object
//! store collaborator and the work-tree core alike.

mod error;
pub mod hex;
mod algorithm;
mod oid;
pub mod hasher;
pub mod collections;

pub use algorithm::HashAlgorithm;
pub use error::HashError;
pub use oid::ObjectId;
