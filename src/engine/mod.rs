//! Reconciliation engine
//!
//! Everything between a lifecycle hook and the switch: target resolution,
//! desired-state computation, convergence with retries, the mapping index,
//! trunk reconciliation, status polling and DNS record sync.

pub mod builder;
pub mod convergence;
pub mod directory;
pub mod dns;
pub mod mapping;
pub mod poller;
pub mod retry;
pub mod trunk;

pub use builder::*;
pub use convergence::*;
pub use directory::*;
pub use dns::*;
pub use mapping::*;
pub use poller::*;
pub use retry::*;
pub use trunk::*;
