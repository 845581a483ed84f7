//! Infrastructure layer

pub mod cleanup;
pub mod persistence;
