//! Value change synchronization: batched outbound reports and inbound apply.

use crate::error::SyncError;
use crate::events::SimEvent;
use crate::protocol::{Outbound, Packet, ValueReport};
use crate::sim::Simulation;
use crate::types::{PeerId, ValueId};
use crate::value::ApplyOutcome;
use std::collections::BTreeMap;
use tracing::{debug, trace, warn};

/// Values written locally since the last flush, with the clock they were marked at.
#[derive(Debug, Default)]
pub struct DirtyBuffer {
    marked: BTreeMap<ValueId, u64>,
}

impl DirtyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a value; a later write before the flush keeps the earliest mark.
    pub fn mark(&mut self, id: &ValueId, clock: u64) {
        self.marked.entry(id.clone()).or_insert(clock);
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }

    pub fn contains(&self, id: &ValueId) -> bool {
        self.marked.contains_key(id)
    }

    fn take(&mut self) -> BTreeMap<ValueId, u64> {
        std::mem::take(&mut self.marked)
    }
}

impl Simulation {
    /// Reports every dirty value that is still present, replicated, written by
    /// this participant and at or past its marked clock. Returns the entry count.
    pub(crate) fn flush_dirty(&mut self) -> usize {
        if self.dirty.is_empty() {
            return 0;
        }
        let local = self.values.local_peer().clone();
        let mut reports = Vec::new();

        for (id, marked) in self.dirty.take() {
            let Some(value) = self.values.get(&id) else {
                continue;
            };
            if !value.replicated() || value.clock() < marked || value.originator() != Some(&local) {
                continue;
            }
            let owner_replicated = self
                .tree
                .get(value.owner())
                .is_some_and(|owner| owner.root().is_replicated());
            if !owner_replicated {
                continue;
            }
            match value.wire() {
                Ok(wire) => reports.push(ValueReport {
                    identifier: id,
                    value: wire,
                    clock: value.clock(),
                }),
                Err(err) => warn!("❌ Cannot report {}: {}", id, err),
            }
        }

        let count = reports.len();
        let batch = self.config.max_reports_per_packet.max(1);
        for chunk in reports.chunks(batch) {
            self.push_outbound(Outbound::broadcast(Packet::ReportValues {
                reports: chunk.to_vec(),
            }));
        }
        if count > 0 {
            self.stats.values_reported += count as u64;
            trace!("📊 Reported {} values", count);
        }
        count
    }

    pub(crate) fn handle_report_values(
        &mut self,
        from: Option<PeerId>,
        reports: Vec<ValueReport>,
    ) -> Result<(), SyncError> {
        let originator = from.unwrap_or_else(PeerId::server);

        for report in reports {
            let replicated = self
                .values
                .get(&report.identifier)
                .is_some_and(|value| value.replicated());
            if !replicated {
                trace!("🔍 Skipping report for {}", report.identifier);
                continue;
            }

            match self.values.apply(
                &report.identifier,
                &report.value,
                report.clock,
                Some(&originator),
            ) {
                Ok(Some(ApplyOutcome::Accepted)) => {
                    self.stats.values_applied += 1;
                    self.bus.emit(&SimEvent::ValueApplied {
                        id: report.identifier,
                        value: report.value,
                        clock: report.clock,
                        originator: Some(originator.clone()),
                    });
                }
                Ok(Some(_)) => self.stats.values_rejected += 1,
                Ok(None) => {}
                Err(err) => {
                    self.stats.values_rejected += 1;
                    debug!("❌ Rejected report for {}: {}", report.identifier, err);
                }
            }
        }
        Ok(())
    }
}
