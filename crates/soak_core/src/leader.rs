//! Leader resolution and local-leadership detection.
//!
//! Leadership is a point-in-time snapshot: it is checked once at
//! bootstrap, never re-verified inside runners, and operations rely on
//! the store's own routing to reach the true leader when it moves.

use std::io;

use tracing::info;

use crate::store::{LeaderInfo, StoreError, StoreHandle};

/// Loopback leaders always count as local.
const LOOPBACK_PREFIX: &str = "127.0.0.1";

#[derive(Debug, thiserror::Error)]
pub enum LeaderError {
    /// The cluster could not report leadership info.
    #[error("leader query failed")]
    Query(#[source] StoreError),
    /// Local interface enumeration failed.
    #[error("interface enumeration failed")]
    Interfaces(#[source] io::Error),
}

/// Ask the cluster for its current leader.
pub async fn resolve_leader(store: &dyn StoreHandle) -> Result<LeaderInfo, LeaderError> {
    let leader = store.leader_info().await.map_err(LeaderError::Query)?;
    info!(node_id = leader.node_id, address = %leader.address, "resolved cluster leader");
    Ok(leader)
}

/// Whether the current leader's address belongs to this host.
pub async fn is_local_leader(store: &dyn StoreHandle) -> Result<bool, LeaderError> {
    let leader = resolve_leader(store).await?;
    if leader.address.starts_with(LOOPBACK_PREFIX) {
        return Ok(true);
    }
    let local = local_addresses()?;
    Ok(leader_matches_local(&leader.address, &local))
}

/// String forms of every address bound to a local interface.
fn local_addresses() -> Result<Vec<String>, LeaderError> {
    let interfaces = if_addrs::get_if_addrs().map_err(LeaderError::Interfaces)?;
    Ok(interfaces
        .into_iter()
        .map(|interface| interface.ip().to_string())
        .collect())
}

/// Exact string comparison against local addresses, with one hardening
/// step: a `host:port` leader address also matches on its host portion.
/// IPv6 zones and DNS names are not normalized.
fn leader_matches_local(leader: &str, local: &[String]) -> bool {
    let host = host_part(leader);
    local.iter().any(|addr| addr == leader || addr == host)
}

/// Strip a trailing `:port` when the remainder is a plain (non-IPv6) host.
fn host_part(leader: &str) -> &str {
    match leader.rsplit_once(':') {
        Some((host, port))
            if !host.is_empty()
                && !host.contains(':')
                && !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            host
        }
        _ => leader,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;

    fn locals(addrs: &[&str]) -> Vec<String> {
        addrs.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn exact_address_match_is_local() {
        assert!(leader_matches_local(
            "10.1.2.3",
            &locals(&["127.0.0.1", "10.1.2.3"])
        ));
    }

    #[test]
    fn host_port_leader_matches_on_host_portion() {
        assert!(leader_matches_local(
            "10.1.2.3:9000",
            &locals(&["127.0.0.1", "10.1.2.3"])
        ));
    }

    #[test]
    fn unbound_address_is_not_local() {
        assert!(!leader_matches_local(
            "10.0.0.9",
            &locals(&["127.0.0.1", "192.168.1.5"])
        ));
    }

    #[test]
    fn ipv6_addresses_are_not_mangled_by_port_stripping() {
        assert_eq!(host_part("::1"), "::1");
        assert_eq!(host_part("fe80::1"), "fe80::1");
        assert_eq!(host_part("10.1.2.3:9000"), "10.1.2.3");
        assert_eq!(host_part("10.1.2.3"), "10.1.2.3");
    }

    #[tokio::test]
    async fn loopback_leader_is_local_regardless_of_interfaces() {
        let store = MemStore::with_leader(LeaderInfo {
            node_id: 3,
            address: "127.0.0.1:9000".to_string(),
        });
        assert!(is_local_leader(&store).await.unwrap());
    }

    #[tokio::test]
    async fn foreign_leader_is_not_local() {
        // TEST-NET-2 is never bound to a real interface.
        let store = MemStore::with_leader(LeaderInfo {
            node_id: 9,
            address: "198.51.100.23:4001".to_string(),
        });
        assert!(!is_local_leader(&store).await.unwrap());
    }
}
