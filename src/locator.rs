/*!
    finding the SDO and PDO ports of the drives on the network

    Discovery itself is done by a [NodeLocator] provided by the application. Discovering is slow and floods the network, so a [NodeLocatorCache] runs it once and every axis created afterwards reuses the result.
*/

use std::{
    io,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex},
    };
use crate::error::{AxisError, AxisResult};


/// the ports one drive listens on
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodePorts {
    pub address: IpAddr,
    /// TCP port of the SDO server
    pub sdo_port: u16,
    /// UDP port of the PDO exchange
    pub pdo_port: u16,
}
impl NodePorts {
    pub fn new(address: IpAddr, sdo_port: u16, pdo_port: u16) -> Self {
        Self {address, sdo_port, pdo_port}
    }
    pub fn sdo(&self) -> SocketAddr {SocketAddr::new(self.address, self.sdo_port)}
    pub fn pdo(&self) -> SocketAddr {SocketAddr::new(self.address, self.pdo_port)}
}

/**
    something able to list the drives present on the network

    Discovery is expected to block for a while, it is run on the blocking threads of the tokio runtime.
*/
pub trait NodeLocator: Send {
    fn locate(&mut self) -> io::Result<Vec<NodePorts>>;
}

/// locator returning a fixed list, for networks where the drives are known in advance
#[derive(Clone, Debug, Default)]
pub struct StaticLocator(pub Vec<NodePorts>);

impl NodeLocator for StaticLocator {
    fn locate(&mut self) -> io::Result<Vec<NodePorts>> {
        Ok(self.0.clone())
    }
}

/**
    runs a locator at most once and answers every later request from its result

    A failed discovery is not remembered: the next request tries again.
*/
pub struct NodeLocatorCache {
    state: Mutex<CacheState>,
}
struct CacheState {
    locator: Box<dyn NodeLocator>,
    nodes: Option<Vec<NodePorts>>,
}

impl NodeLocatorCache {
    pub fn new(locator: impl NodeLocator + 'static) -> Arc<Self> {
        Arc::new(Self {state: Mutex::new(CacheState {
            locator: Box::new(locator),
            nodes: None,
        })})
    }

    /**
        ports of the drive at the given address, discovering the network first if not already done

        The lookup runs with [tokio::task::spawn_blocking], so a slow discovery does not stall the other tasks. Concurrent calls wait for the first discovery to finish instead of starting their own.
    */
    pub async fn resolve(self: &Arc<Self>, address: IpAddr) -> AxisResult<NodePorts> {
        let cache = self.clone();
        tokio::task::spawn_blocking(move || cache.resolve_blocking(address)).await
            .map_err(|error| io::Error::new(io::ErrorKind::Other, error))?
    }

    fn resolve_blocking(&self, address: IpAddr) -> AxisResult<NodePorts> {
        let mut state = self.state.lock()
            .map_err(|_| AxisError::Config("node locator poisoned by a previous panic".into()))?;
        if state.nodes.is_none() {
            let found = state.locator.locate()?;
            log::debug!("node discovery found {} nodes", found.len());
            state.nodes = Some(found);
        }
        let nodes = state.nodes.as_deref().unwrap_or_default();
        nodes.iter()
            .find(|node| node.address == address)
            .copied()
            .ok_or_else(|| AxisError::Config(format!("no node found at {}", address)))
    }

    /// the nodes discovered so far, `None` if discovery has not run yet
    pub fn discovered(&self) -> Option<Vec<NodePorts>> {
        self.state.lock().ok()?.nodes.clone()
    }
}
