//! Deterministic VPN address allocation for locally provisioned peers.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::net::Ipv4Addr;

/// Host octets below this are reserved for the server and infrastructure.
const RESERVED_HOSTS: u64 = 10;

/// Highest usable host octet in a /24 (255 is broadcast).
const MAX_HOST: u64 = 254;

/// Allocate a `/32` client address inside `subnet` for `user_id`.
///
/// The host octet is derived from a hash of the user id, mapped into the
/// usable range above the reserved low addresses. The scheme is intentionally
/// deterministic; collisions between users are caught by the unique
/// constraint on the peer table, not here. Returns `None` when the subnet is
/// not a parseable IPv4 CIDR.
#[must_use]
pub fn allocate_address(subnet: &str, user_id: i32) -> Option<String> {
    let (network, _prefix) = parse_subnet(subnet)?;
    let octets = network.octets();

    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    let host = RESERVED_HOSTS + hasher.finish() % (MAX_HOST - RESERVED_HOSTS + 1);

    #[allow(clippy::cast_possible_truncation)]
    let addr = Ipv4Addr::new(octets[0], octets[1], octets[2], host as u8);
    Some(format!("{addr}/32"))
}

fn parse_subnet(subnet: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = subnet.split_once('/')?;
    let addr: Ipv4Addr = addr.trim().parse().ok()?;
    let prefix: u8 = prefix.trim().parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((addr, prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_deterministic() {
        let a = allocate_address("10.8.0.0/24", 7);
        let b = allocate_address("10.8.0.0/24", 7);
        assert_eq!(a, b);
    }

    #[test]
    fn test_allocation_stays_in_subnet_and_avoids_reserved() {
        for user_id in 0..500 {
            let addr = allocate_address("10.8.0.0/24", user_id).expect("valid subnet");
            let host: u64 = addr
                .strip_prefix("10.8.0.")
                .and_then(|rest| rest.strip_suffix("/32"))
                .and_then(|octet| octet.parse().ok())
                .expect("address shape");
            assert!((RESERVED_HOSTS..=MAX_HOST).contains(&host), "host {host}");
        }
    }

    #[test]
    fn test_invalid_subnet_yields_none() {
        assert_eq!(allocate_address("not-a-subnet", 1), None);
        assert_eq!(allocate_address("10.8.0.0/64", 1), None);
    }
}
