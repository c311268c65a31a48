//! Switchport Reconciler - Physical Switch Port Convergence
//!
//! Reconciles logical network topology (networks, ports, trunk subports)
//! against the port configuration of access switches managed by a UniFi
//! Network controller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                      Host Framework Lifecycle Hooks                          │
//! │              (REST hook surface or direct library calls)                     │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                              Reconciler                                      │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │  Port Config    │  │     Trunk       │  │        DNS Record           │  │
//! │  │    Builder      │  │   Reconciler    │  │          Sync               │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────────────────────┘  │
//! │           └────────────────────┤                                             │
//! │                    ┌───────────┴───────────┐    ┌───────────────────────┐   │
//! │                    │  Convergence Pusher   │    │    Status Poller      │   │
//! │                    │  (bounded retries)    │    │  (background task)    │   │
//! │                    └───────────┬───────────┘    └──────────┬────────────┘   │
//! │                                │                           │                 │
//! │            ┌───────────────────┼───────────────────────────┤                 │
//! │  ┌─────────┴─────────┐  ┌──────┴────────────┐                               │
//! │  │  Mapping Index    │  │ Switch Directory  │                               │
//! │  │ (port → switch)   │  │ (inventory TTL)   │                               │
//! │  └───────────────────┘  └──────┬────────────┘                               │
//! ├────────────────────────────────┼────────────────────────────────────────────┤
//! │                      Switch Controller Adapters                              │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────────────────┐   │
//! │  │   UniFi Network (reqwest)   │  │            In-memory                │   │
//! │  └─────────────────────────────┘  └─────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Reconciler, adapters and the hook API
//! - [`engine`]: Directory, builder, pusher, mapping index, trunks, poller
//! - [`domain`]: Topology and controller types, adapter traits
//! - [`config`]: YAML configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod controlplane;
pub mod domain;
pub mod engine;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use controlplane::{
    ApiServer, ApiServerConfig, ControllerFactory, HostAdapters, HostFactory, Reconciler,
    ReconcilerStatus, RestRouter,
};

pub use config::{ControllerKind, EngineConfig, FeatureFlags, HostKind};

pub use domain::ports::{
    ControllerRef, StatusSink, StatusSinkRef, SwitchController, TopologySource,
    TopologySourceRef,
};

pub use domain::topology::{
    BindingLink, LogicalPort, Network, PortBinding, PortRef, PortStatus, Segment, Subport,
    TrunkRole,
};

pub use domain::vlan::VlanId;

pub use engine::{
    CycleReport, DesiredPortConfig, MappingEntry, MappingIndex, PhysicalPortRef, PollerState,
    TrunkState, VlanMode,
};

pub use error::{Error, ErrorAction, Result};

pub use metrics::EngineMetrics;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
