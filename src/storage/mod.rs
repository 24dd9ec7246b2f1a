pub mod codec;
pub mod error;
pub mod etcd;
pub mod memory;
pub mod traits;

pub use error::StoreError;
pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use traits::{AddOutcome, RuleListing, RuleStore};
