//! Domain model

pub mod repositories;
pub mod token;
pub mod unit_of_work;

pub use token::Token;
