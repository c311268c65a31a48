//! API Module
//!
//! REST surface receiving the host framework's lifecycle hooks.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
