//! Partition routing.
//!
//! The router is a pure function from a caller-facing
//! [`PartitionTarget`] to the [`RoutedTarget`] handed to the transport.
//! It does not compute a hash: key-to-partition determinism is a broker
//! guarantee, and the router's contract is only that the same key is
//! passed through verbatim on every call.

use rill_core::{PartitionId, PartitionTarget};

/// The normalized target handed to the transport for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutedTarget {
    /// Let the broker choose a partition.
    Any,
    /// Opaque routing key; the broker maps it to a partition.
    Key(String),
    /// Explicit partition. Existence is validated by the transport.
    Partition(PartitionId),
}

/// Normalizes a partition target for the transport.
///
/// An empty routing key carries no co-partitioning intent and is
/// equivalent to [`PartitionTarget::Any`].
#[must_use]
pub fn route(target: PartitionTarget) -> RoutedTarget {
    match target {
        PartitionTarget::Any => RoutedTarget::Any,
        PartitionTarget::RoutingKey(key) => {
            if key.is_empty() {
                RoutedTarget::Any
            } else {
                RoutedTarget::Key(key)
            }
        }
        PartitionTarget::Partition(id) => RoutedTarget::Partition(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_any() {
        assert_eq!(route(PartitionTarget::Any), RoutedTarget::Any);
    }

    #[test]
    fn test_route_key_passthrough() {
        let routed = route(PartitionTarget::RoutingKey("device-1".to_string()));
        assert_eq!(routed, RoutedTarget::Key("device-1".to_string()));
    }

    #[test]
    fn test_route_empty_key_is_any() {
        let routed = route(PartitionTarget::RoutingKey(String::new()));
        assert_eq!(routed, RoutedTarget::Any);
    }

    #[test]
    fn test_route_explicit_partition() {
        let routed = route(PartitionTarget::Partition(PartitionId::new(3)));
        assert_eq!(routed, RoutedTarget::Partition(PartitionId::new(3)));
    }
}
