//! Partition cursor resolution.
//!
//! Turns a logical [`StartPosition`] into the concrete, exclusive start
//! a subscription opens at. `Beginning` and `Latest` require a fresh
//! metadata snapshot (which also validates that the partition exists);
//! a caller-supplied resume point passes through untouched.

use rill_core::{ConcreteStart, PartitionId, StartPosition};
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::transport::{BrokerTransport, TransportError};

/// Resolves a start policy against a partition's current metadata.
///
/// `Latest` resolves to "after the last enqueued sequence number at
/// fetch time". Records enqueued between this fetch and the subsequent
/// subscription open may or may not be observed; that window is inherent
/// to the policy and deliberately not papered over. On an empty
/// partition `Latest` resolves to the beginning, so every future record
/// is observed.
///
/// # Errors
///
/// - [`ClientError::UnknownPartition`] if the partition does not exist.
/// - [`ClientError::MetadataUnavailable`] on transient transport
///   failure; safe to retry.
pub async fn resolve_start(
    transport: &dyn BrokerTransport,
    partition_id: PartitionId,
    policy: StartPosition,
) -> ClientResult<ConcreteStart> {
    // A caller-supplied resume point needs no metadata.
    if let StartPosition::AfterSequenceNumber(sequence_number) = policy {
        return Ok(ConcreteStart::After(sequence_number));
    }

    let metadata = transport
        .partition_metadata(partition_id)
        .await
        .map_err(|source| match source {
            TransportError::UnknownPartition { partition_id } => {
                ClientError::UnknownPartition { partition_id }
            }
            other => ClientError::MetadataUnavailable {
                message: other.to_string(),
            },
        })?;

    let start = match policy {
        StartPosition::Beginning => ConcreteStart::Beginning,
        StartPosition::Latest => metadata
            .last_enqueued_sequence_number
            .map_or(ConcreteStart::Beginning, ConcreteStart::After),
        StartPosition::AfterSequenceNumber(_) => unreachable!("handled above"),
    };

    debug!(%partition_id, ?policy, ?start, "resolved start position");
    Ok(start)
}
