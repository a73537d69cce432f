//! Configuration loading: TOML settings and the selector table

pub mod methods;
pub mod settings;

pub use methods::MethodTable;
pub use settings::*;
