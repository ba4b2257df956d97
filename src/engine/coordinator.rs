//! Pairing of doors that serve one boarding bay.
//!
//! With two doors on a bay, a close on one door mid-cycle is not the end of
//! boarding. Finalized records are held until the companion door has also
//! closed, then released as a single combined completion.

use crate::engine::session::FinalizedSession;
use crate::state::DoorId;
use std::collections::HashMap;
use tracing::debug;

/// One combined boarding completion for a bay, carrying every record that was
/// held for it.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardingComplete {
    pub records: Vec<FinalizedSession>,
}

#[derive(Debug)]
pub struct DoorCoordinator {
    partners: HashMap<DoorId, DoorId>,
    pending: HashMap<DoorId, FinalizedSession>,
}

impl DoorCoordinator {
    pub fn new(pairs: &[(DoorId, DoorId)]) -> Self {
        let mut partners = HashMap::new();
        for (a, b) in pairs {
            partners.insert(*a, *b);
            partners.insert(*b, *a);
        }
        Self {
            partners,
            pending: HashMap::new(),
        }
    }

    pub fn partner_of(&self, door_id: DoorId) -> Option<DoorId> {
        self.partners.get(&door_id).copied()
    }

    /// Routes a finalized record. Unpaired doors complete immediately; paired
    /// doors complete only once the companion is closed, combining with any
    /// record the companion already parked.
    pub fn session_finalized(
        &mut self,
        record: FinalizedSession,
        partner_open: bool,
    ) -> Option<BoardingComplete> {
        let Some(partner) = self.partner_of(record.door_id) else {
            return Some(BoardingComplete {
                records: vec![record],
            });
        };

        if partner_open {
            debug!(
                door_id = record.door_id,
                partner = partner,
                "Holding finalized session until companion door closes"
            );
            self.pending.insert(record.door_id, record);
            return None;
        }

        let mut records = Vec::with_capacity(2);
        if let Some(held) = self.pending.remove(&partner) {
            records.push(held);
        }
        records.push(record);
        Some(BoardingComplete { records })
    }

    /// A paired door closed without producing a record (discard or no open
    /// session). Releases whatever its companion had parked.
    pub fn door_closed_without_record(&mut self, door_id: DoorId) -> Option<BoardingComplete> {
        let partner = self.partner_of(door_id)?;
        let held = self.pending.remove(&partner)?;
        Some(BoardingComplete {
            records: vec![held],
        })
    }
}
