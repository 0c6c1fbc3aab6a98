//! Shared types for the shop admin client workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
