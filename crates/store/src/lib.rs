//! oidstore - repository-backed token lifecycle store for an external OIDC
//! engine: CRUD, multi-predicate lookup, lazy cancellable result streams,
//! and batched fault-tolerant pruning.

pub mod domain;
pub mod infrastructure;
pub mod stores;

pub use domain::Token;
pub use stores::{ResultStream, TokenStore};
