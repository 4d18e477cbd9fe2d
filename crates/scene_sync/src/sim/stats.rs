/// Statistics tracking for a simulation's replication traffic
use serde::{Deserialize, Serialize};

/// Counters kept by a simulation for monitoring
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Packets queued for the transport
    pub packets_sent: u64,
    /// Packets handed to `receive`
    pub packets_received: u64,
    /// Inbound packets dropped because they could not be applied
    pub packets_dropped: u64,
    /// Value entries sent in `ReportValues` packets
    pub values_reported: u64,
    /// Remote value updates accepted
    pub values_applied: u64,
    /// Remote value updates rejected as stale, tie-lost or malformed
    pub values_rejected: u64,
}
