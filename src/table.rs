use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use crate::connection::Connection;
use crate::engine::CryptoEngine;
use crate::SafeAddr;

/// Live connections by peer address, with a per source IP count.
///
/// The count is what the per-IP connection cap is checked against. It is
/// kept in step with the map by only ever inserting and removing through
/// this type.
pub struct ConnectionTable<E> {
    connections: HashMap<SocketAddr, Connection<E>>,
    per_ip: HashMap<IpAddr, usize>,
}

impl<E: CryptoEngine> ConnectionTable<E> {
    pub fn new() -> Self {
        ConnectionTable {
            connections: HashMap::new(),
            per_ip: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.connections.contains_key(addr)
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<&Connection<E>> {
        self.connections.get(addr)
    }

    pub fn get_mut(&mut self, addr: &SocketAddr) -> Option<&mut Connection<E>> {
        self.connections.get_mut(addr)
    }

    /// Connections currently held for `ip`, any port.
    pub fn count_for(&self, ip: IpAddr) -> usize {
        self.per_ip.get(&ip).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection<E>> {
        self.connections.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection<E>> {
        self.connections.values_mut()
    }

    /// Add a connection. Replaces (and returns) any previous one for the same
    /// address.
    pub fn insert(&mut self, connection: Connection<E>) -> Option<Connection<E>> {
        let addr = connection.addr();
        let previous = self.connections.insert(addr, connection);
        if previous.is_none() {
            *self.per_ip.entry(addr.ip()).or_insert(0) += 1;
        }
        previous
    }

    pub fn remove(&mut self, addr: &SocketAddr) -> Option<Connection<E>> {
        let connection = self.connections.remove(addr)?;

        let ip = addr.ip();
        if let Some(n) = self.per_ip.get_mut(&ip) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.per_ip.remove(&ip);
            }
        }

        Some(connection)
    }

    /// Remove every disconnected connection. Returns their addresses.
    pub fn sweep(&mut self) -> Vec<SocketAddr> {
        let dead: Vec<SocketAddr> = self
            .connections
            .values()
            .filter(|c| !c.state().is_active())
            .map(|c| c.addr())
            .collect();

        for addr in &dead {
            self.remove(addr);
            debug!("{} Connection removed", SafeAddr(addr));
        }

        dead
    }
}

impl<E: CryptoEngine> Default for ConnectionTable<E> {
    fn default() -> Self {
        Self::new()
    }
}
