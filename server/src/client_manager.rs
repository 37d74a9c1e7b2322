//! Registry of live connections.
//!
//! Every accepted WebSocket gets a [`Client`] entry here, keyed by a short
//! random id. The manager enforces the connection capacity and hands out ids
//! that are unique among live connections.

use crate::client::{Client, Outbox};
use crate::utils::{create_id, ID_LENGTH};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::ClientId;
use std::collections::HashMap;

pub struct ClientManager {
    /// Connected clients indexed by their id
    clients: HashMap<ClientId, Client>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    rng: StdRng,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self::with_rng(max_clients, StdRng::from_entropy())
    }

    pub fn with_rng(max_clients: usize, rng: StdRng) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            rng,
        }
    }

    /// Registers a new connection.
    ///
    /// Returns `None` if the relay is at capacity.
    pub fn add_client(&mut self, outbox: Outbox) -> Option<ClientId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = loop {
            let id = create_id(&mut self.rng, ID_LENGTH);
            if !self.clients.contains_key(&id) {
                break id;
            }
        };

        info!("Client {} connected", client_id);
        self.clients
            .insert(client_id.clone(), Client::new(client_id.clone(), outbox));
        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &str) -> Option<Client> {
        let client = self.clients.remove(client_id)?;
        info!(
            "Client {} disconnected after {:.1}s",
            client.id,
            client.connected_at.elapsed().as_secs_f32()
        );
        Some(client)
    }

    pub fn get(&self, client_id: &str) -> Option<&Client> {
        self.clients.get(client_id)
    }

    pub fn get_mut(&mut self, client_id: &str) -> Option<&mut Client> {
        self.clients.get_mut(client_id)
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn manager(max_clients: usize) -> ClientManager {
        ClientManager::with_rng(max_clients, StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_add_client() {
        let mut manager = manager(2);
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = manager.add_client(tx).unwrap();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(manager.contains(&id));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut manager = manager(500);
        let mut ids = std::collections::HashSet::new();
        for _ in 0..500 {
            let (tx, _rx) = mpsc::unbounded_channel();
            assert!(ids.insert(manager.add_client(tx).unwrap()));
        }
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = manager(1);
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        assert!(manager.add_client(tx1).is_some());
        assert!(manager.add_client(tx2).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = manager(2);
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = manager.add_client(tx).unwrap();

        assert!(manager.remove_client(&id).is_some());
        assert!(manager.is_empty());
        assert!(manager.remove_client(&id).is_none());
    }
}
