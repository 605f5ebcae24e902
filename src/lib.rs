//! study-tree: modification trees for power-grid studies
//!
//! A study is a rooted tree of modification nodes branching from one or more base-case root
//! networks. This crate keeps the tree consistent under structural edits, tracks per-node build
//! status on every root network, derives replay plans for builds and invalidates whatever an
//! edit made stale.

pub mod alias;
pub mod api;
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod logging;
pub mod modification;
pub mod mutation;
pub mod notification;
pub mod overlay;
pub mod remote;
pub mod status;
pub mod store;
pub mod study;
pub mod tree;
pub mod types;

pub use api::StudyTreeApi;
pub use error::{ApiError, ErrorKind, StorageError};
