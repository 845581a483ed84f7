//! Engine-facing store adapters

mod stream;
mod token_store;

pub use stream::ResultStream;
pub use token_store::TokenStore;
