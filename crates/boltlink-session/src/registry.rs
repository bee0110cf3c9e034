//! The host's table of which peer holds which player slot.

use std::collections::HashMap;

use boltlink_protocol::PlayerId;
use boltlink_transport::PeerId;

use crate::SessionError;

/// Maps client player slots (2 and 3) to transport peers.
///
/// A slot holds at most one peer, and a peer holds at most one slot. New
/// peers take the lowest free slot, so a slot freed by a disconnect is
/// the next one handed out.
///
/// The reverse map stands in for tagging the peer handle with its player
/// id: the transport owns peers, so we remember the id on our side.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    slots: [Option<PeerId>; PlayerId::CLIENT_SLOTS.len()],
    by_peer: HashMap<PeerId, PlayerId>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `peer` the lowest free slot.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyRegistered`] if `peer` already has a slot
    /// - [`SessionError::SessionFull`] if no slot is free
    pub fn assign(&mut self, peer: PeerId) -> Result<PlayerId, SessionError> {
        if self.by_peer.contains_key(&peer) {
            return Err(SessionError::AlreadyRegistered(peer));
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SessionError::SessionFull)?;

        let player_id = PlayerId::CLIENT_SLOTS[index];
        self.slots[index] = Some(peer);
        self.by_peer.insert(peer, player_id);
        Ok(player_id)
    }

    /// Frees whatever slot `peer` holds and returns its player id.
    ///
    /// Returns `None` for peers that never got a slot, such as one that
    /// was turned away because the session was full.
    pub fn release(&mut self, peer: PeerId) -> Option<PlayerId> {
        let player_id = self.by_peer.remove(&peer)?;
        if let Some(slot) = slot_index(player_id).and_then(|i| self.slots.get_mut(i)) {
            *slot = None;
        }
        Some(player_id)
    }

    pub fn peer_of(&self, player_id: PlayerId) -> Option<PeerId> {
        slot_index(player_id).and_then(|i| self.slots[i])
    }

    pub fn player_of(&self, peer: PeerId) -> Option<PlayerId> {
        self.by_peer.get(&peer).copied()
    }

    /// Occupied slots in player id order.
    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, PeerId)> + '_ {
        PlayerId::CLIENT_SLOTS
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(&id, slot)| slot.map(|peer| (id, peer)))
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots = Default::default();
        self.by_peer.clear();
    }
}

fn slot_index(player_id: PlayerId) -> Option<usize> {
    PlayerId::CLIENT_SLOTS.iter().position(|&id| id == player_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u64) -> PeerId {
        PeerId::new(n)
    }

    #[test]
    fn test_assign_hands_out_slots_in_order() {
        let mut registry = PeerRegistry::new();

        assert_eq!(registry.assign(peer(10)).unwrap(), PlayerId(2));
        assert_eq!(registry.assign(peer(11)).unwrap(), PlayerId(3));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_assign_when_full_returns_session_full() {
        let mut registry = PeerRegistry::new();
        registry.assign(peer(1)).unwrap();
        registry.assign(peer(2)).unwrap();

        let result = registry.assign(peer(3));

        assert!(matches!(result, Err(SessionError::SessionFull)));
        assert_eq!(registry.player_of(peer(3)), None);
    }

    #[test]
    fn test_assign_same_peer_twice_returns_already_registered() {
        let mut registry = PeerRegistry::new();
        registry.assign(peer(1)).unwrap();

        let result = registry.assign(peer(1));

        assert!(matches!(result, Err(SessionError::AlreadyRegistered(p)) if p == peer(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_release_then_assign_reuses_lowest_slot() {
        let mut registry = PeerRegistry::new();
        registry.assign(peer(1)).unwrap();
        registry.assign(peer(2)).unwrap();

        assert_eq!(registry.release(peer(1)), Some(PlayerId(2)));
        assert_eq!(registry.assign(peer(3)).unwrap(), PlayerId(2));
        assert_eq!(registry.peer_of(PlayerId(2)), Some(peer(3)));
        assert_eq!(registry.peer_of(PlayerId(3)), Some(peer(2)));
    }

    #[test]
    fn test_release_unregistered_peer_returns_none() {
        let mut registry = PeerRegistry::new();
        assert_eq!(registry.release(peer(9)), None);
    }

    #[test]
    fn test_peer_of_host_id_is_none() {
        let mut registry = PeerRegistry::new();
        registry.assign(peer(1)).unwrap();
        assert_eq!(registry.peer_of(PlayerId::HOST), None);
    }

    #[test]
    fn test_iter_yields_player_id_order() {
        let mut registry = PeerRegistry::new();
        registry.assign(peer(1)).unwrap();
        registry.assign(peer(2)).unwrap();
        registry.release(peer(1));
        registry.assign(peer(3)).unwrap();

        let pairs: Vec<_> = registry.iter().collect();

        assert_eq!(pairs, vec![(PlayerId(2), peer(3)), (PlayerId(3), peer(2))]);
    }

    #[test]
    fn test_clear_empties_both_maps() {
        let mut registry = PeerRegistry::new();
        registry.assign(peer(1)).unwrap();

        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(registry.peer_of(PlayerId(2)), None);
        assert_eq!(registry.assign(peer(1)).unwrap(), PlayerId(2));
    }
}
