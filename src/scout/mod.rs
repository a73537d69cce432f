pub mod filter;
pub mod scanner;

pub use filter::MethodClassifier;
pub use scanner::{extract_candidate_addresses, TokenClassifier};
