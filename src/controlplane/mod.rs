//! Control Plane Module
//!
//! The reconciler that receives lifecycle hooks, the adapters it talks
//! through, and the API that exposes it.

pub mod api;
pub mod controller;
pub mod host;
pub mod reconciler;

pub use api::*;
pub use controller::*;
pub use host::*;
pub use reconciler::*;
