//! Switch Controller Adapters
//!
//! Provides adapters for the switch controller seam:
//! - UniFi: the UniFi Network application over HTTPS
//! - Memory: in-process inventory for standalone mode and tests

pub mod memory;
pub mod unifi;

pub use memory::*;
pub use unifi::*;

use crate::config::{ControllerConfig, ControllerKind};
use crate::domain::ports::ControllerRef;
use crate::error::Result;
use std::sync::Arc;

/// Factory for creating controller adapters
pub struct ControllerFactory;

impl ControllerFactory {
    /// Create the adapter selected by `config.kind`
    pub fn create(config: &ControllerConfig) -> Result<ControllerRef> {
        match config.kind {
            ControllerKind::Unifi => Ok(Arc::new(UnifiController::new(config.clone())?)),
            ControllerKind::Memory => Ok(InMemoryController::new()),
        }
    }
}
