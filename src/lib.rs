pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod observability;
pub mod policy;
pub mod storage;

pub use config::{Cli, Settings};
pub use domain::{Decision, ReviewRequest, Rule};
pub use policy::DecisionEngine;
pub use storage::{RuleStore, StoreError};
