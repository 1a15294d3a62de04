//! Registry of the connections served by one poll group (one poll thread,
//! one or more shared cores).

use crate::config::SdkContext;
use crate::connection::Connection;
use crate::endpoint::EndpointHandle;
use crate::error::TransportError;
use crate::flat_map::FlatMap;

pub struct EndpointManager {
    connections: FlatMap<EndpointHandle, Connection>,
    max_endpoints: usize,
    next_handle: u64,
}

impl EndpointManager {
    pub fn new(context: SdkContext) -> Self {
        Self {
            connections: FlatMap::new(),
            max_endpoints: context.max_endpoints_per_poll_group,
            next_handle: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn allocate_handle(&mut self) -> Result<EndpointHandle, TransportError> {
        if self.connections.len() >= self.max_endpoints {
            return Err(TransportError::EndpointManagerFull(self.max_endpoints));
        }
        let handle = EndpointHandle(self.next_handle);
        self.next_handle += 1;
        Ok(handle)
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.endpoint.handle, connection);
    }

    pub fn remove(&mut self, handle: EndpointHandle) -> Option<Connection> {
        self.connections.remove(&handle)
    }

    pub fn get_mut(&mut self, handle: EndpointHandle) -> Option<&mut Connection> {
        self.connections.get_mut(&handle)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterHandle, LoopbackAdapter};
    use crate::config::{ConnectionConfig, DataType, Direction};
    use crate::endpoint::Endpoint;
    use crate::sync::Signal;
    use std::sync::Arc;

    fn make_connection(manager: &mut EndpointManager) -> EndpointHandle {
        let handle = manager.allocate_handle().unwrap();
        let cfg = ConnectionConfig::new(Direction::Tx, DataType::Video, "cam0", handle.0 as u32);
        let endpoint = Endpoint::new(handle, handle.0, cfg, Arc::new(Signal::new()));
        let adapter = AdapterHandle::Loopback(LoopbackAdapter::new([0; 32], 16));
        manager.insert(Connection::new(endpoint, adapter));
        handle
    }

    #[test]
    fn enforces_max_endpoints() {
        let mut manager = EndpointManager::new(SdkContext {
            max_endpoints_per_poll_group: 2,
        });
        make_connection(&mut manager);
        make_connection(&mut manager);
        assert!(matches!(
            manager.allocate_handle(),
            Err(TransportError::EndpointManagerFull(2))
        ));
    }

    #[test]
    fn remove_frees_a_slot() {
        let mut manager = EndpointManager::new(SdkContext {
            max_endpoints_per_poll_group: 1,
        });
        let handle = make_connection(&mut manager);
        assert!(manager.allocate_handle().is_err());
        manager.remove(handle);
        assert!(manager.allocate_handle().is_ok());
    }
}
