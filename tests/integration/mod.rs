//! Integration tests for the study tree engine, driven through the public API with in-memory
//! remote collaborators.

mod build_lifecycle;
mod invalidation;
mod modifications;
mod persistence;
mod test_utils;
mod tree_mutation;
