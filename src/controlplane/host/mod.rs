//! Host Framework Adapters
//!
//! Provides the status sink and topology source the engine talks to:
//! - HTTP: the host framework's REST API
//! - Memory: in-process state for standalone mode and tests

pub mod http;
pub mod memory;

pub use http::*;
pub use memory::*;

use crate::config::{HostConfig, HostKind};
use crate::domain::ports::{StatusSinkRef, TopologySourceRef};
use crate::error::Result;
use std::sync::Arc;

/// Both host-facing seams, backed by one adapter
#[derive(Clone, Debug)]
pub struct HostAdapters {
    pub sink: StatusSinkRef,
    pub topology: TopologySourceRef,
}

/// Factory for creating host adapters
pub struct HostFactory;

impl HostFactory {
    pub fn create(config: &HostConfig) -> Result<HostAdapters> {
        match config.kind {
            HostKind::Http => {
                let host = Arc::new(HttpHost::new(config)?);
                Ok(HostAdapters {
                    sink: host.clone(),
                    topology: host,
                })
            }
            HostKind::Memory => Ok(Self::memory(InMemoryHost::new())),
        }
    }

    /// Wrap an existing in-memory host
    pub fn memory(host: Arc<InMemoryHost>) -> HostAdapters {
        HostAdapters {
            sink: host.clone(),
            topology: host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;

    #[test]
    fn test_http_requires_url() {
        let config = HostConfig {
            kind: HostKind::Http,
            ..HostConfig::default()
        };
        assert_matches!(HostFactory::create(&config), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_memory_default() {
        assert!(HostFactory::create(&HostConfig::default()).is_ok());
    }
}
