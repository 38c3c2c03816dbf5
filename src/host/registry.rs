//! Connection registry

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ModuleHost, ModuleRegistry};

/// Registered connections, keyed by connection id
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Arc<dyn ModuleHost>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its own id, replacing any previous one
    pub fn register(&self, host: Arc<dyn ModuleHost>) {
        let id = host.connection_id().to_string();
        if self.connections.insert(id.clone(), host).is_some() {
            debug!("Connection '{}' replaced", id);
        } else {
            info!("🔌 Connection '{}' registered", id);
        }
    }

    pub fn unregister(&self, connection_id: &str) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl ModuleRegistry for ConnectionRegistry {
    fn connection(&self, connection_id: &str) -> Option<Arc<dyn ModuleHost>> {
        self.connections.get(connection_id).map(|e| e.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ConsoleModuleHost;

    #[test]
    fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        registry.register(Arc::new(ConsoleModuleHost::new("obs")));
        registry.register(Arc::new(ConsoleModuleHost::new("atem")));

        assert_eq!(registry.list(), vec!["atem", "obs"]);
        assert!(registry.connection("obs").is_some());
        assert!(registry.connection("vmix").is_none());

        assert!(registry.unregister("obs"));
        assert!(!registry.unregister("obs"));
        assert!(registry.connection("obs").is_none());
    }
}
