pub mod review;
pub mod rule;

pub use review::{Decision, ReviewRequest, DEFAULT_DENY_REASON};
pub use rule::Rule;
