//! Domain layer - Core types and port definitions
//!
//! This module defines the logical topology the host hands us, the
//! controller's inventory model, and the traits (ports) that adapters
//! implement, following hexagonal architecture principles.

pub mod controller;
pub mod ports;
pub mod topology;
pub mod vlan;

pub use controller::*;
pub use ports::*;
pub use topology::*;
pub use vlan::*;
