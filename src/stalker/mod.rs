pub mod detector;
pub mod tracker;

pub use detector::{SpamDetector, SpamVerdict};
pub use tracker::{ActivityTracker, AddressActivity, MethodCounter};
