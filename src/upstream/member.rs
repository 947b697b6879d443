//! Upstream members and the per-service member set.
//!
//! # Responsibilities
//! - Represent one reachable (address, port) pair
//! - Keep at most one member per address
//!
//! # Design Decisions
//! - Identity is the address alone: a service is one container that may be
//!   restarted on a new port, not a pool of same-address replicas
//! - Insertion order is kept so rendered output is stable

use std::fmt;

/// One reachable endpoint backing a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UpstreamMember {
    pub address: String,
    pub port: u16,
}

impl UpstreamMember {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for UpstreamMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Ordered member collection keyed by address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSet {
    members: Vec<UpstreamMember>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the member with the same address, or append.
    ///
    /// Returns true when the set changed.
    pub fn upsert(&mut self, member: UpstreamMember) -> bool {
        match self.members.iter_mut().find(|m| m.address == member.address) {
            Some(existing) if *existing == member => false,
            Some(existing) => {
                *existing = member;
                true
            }
            None => {
                self.members.push(member);
                true
            }
        }
    }

    /// Remove the member with `address`. Returns the removed member, if any.
    pub fn remove(&mut self, address: &str) -> Option<UpstreamMember> {
        let index = self.members.iter().position(|m| m.address == address)?;
        Some(self.members.remove(index))
    }

    #[cfg(test)]
    pub(crate) fn get(&self, address: &str) -> Option<&UpstreamMember> {
        self.members.iter().find(|m| m.address == address)
    }

    pub fn as_slice(&self) -> &[UpstreamMember] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_upsert_replaces_port_for_same_address() {
        let mut set = MemberSet::new();
        assert!(set.upsert(UpstreamMember::new("10.0.0.1", 33000)));
        assert!(set.upsert(UpstreamMember::new("10.0.0.1", 33001)));
        assert!(!set.upsert(UpstreamMember::new("10.0.0.1", 33001)));

        assert_eq!(set.as_slice(), &[UpstreamMember::new("10.0.0.1", 33001)]);
    }

    #[test]
    fn test_insertion_order_kept() {
        let mut set = MemberSet::new();
        set.upsert(UpstreamMember::new("10.0.0.2", 80));
        set.upsert(UpstreamMember::new("10.0.0.1", 80));
        set.upsert(UpstreamMember::new("10.0.0.2", 81));

        let addrs: Vec<_> = set.as_slice().iter().map(|m| m.to_string()).collect();
        assert_eq!(addrs, vec!["10.0.0.2:81", "10.0.0.1:80"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut set = MemberSet::new();
        set.upsert(UpstreamMember::new("10.0.0.1", 80));

        assert_eq!(set.remove("10.0.0.1"), Some(UpstreamMember::new("10.0.0.1", 80)));
        assert_eq!(set.remove("10.0.0.1"), None);
        assert!(set.is_empty());
    }

    #[test]
    fn test_matches_map_semantics() {
        // Deterministic pseudo-random op sequence checked against a plain map.
        let mut set = MemberSet::new();
        let mut model: HashMap<String, u16> = HashMap::new();
        let mut seed: u32 = 7;

        for _ in 0..500 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let addr = format!("10.0.0.{}", (seed >> 16) % 5);
            let port = 30000 + ((seed >> 8) % 4) as u16;
            if (seed >> 4) % 3 == 0 {
                set.remove(&addr);
                model.remove(&addr);
            } else {
                set.upsert(UpstreamMember::new(addr.clone(), port));
                model.insert(addr, port);
            }

            assert_eq!(set.len(), model.len());
            for (addr, port) in &model {
                assert_eq!(set.get(addr).map(|m| m.port), Some(*port));
            }
        }
    }
}
