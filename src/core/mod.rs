pub mod error;
pub mod types;

pub use error::ChainError;
pub use types::*;
