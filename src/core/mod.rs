//! Core traits, constants and error types shared by every layer.

pub mod constants;
mod error;
mod traits;

pub use constants::*;
pub use error::*;
pub use traits::DiffableState;
