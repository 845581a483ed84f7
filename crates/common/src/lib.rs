//! oidstore-common - shared identifier types

mod keys;

pub use keys::{ApplicationId, AuthorizationId, TokenId};
