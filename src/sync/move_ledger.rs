//! Replication of the played-move ledger.
//!
//! The owner diffs its session ledger against the replicated mirror on every
//! tick and pushes the difference as tail edits. Observers turn the mirror's
//! list events back into ledger diffs for the session to apply.

use tracing::debug;

use crate::moves::move_descriptions::Move;
use crate::sync::replicated_var::{ListDelta, ReplicatedMoveList};
use crate::sync::transport::{ChannelId, NetCommand, NetEvent, ObjectId, ParticipantId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerDiff {
    Append { index: usize, mv: Move },
    RemoveAt { index: usize, mv: Move },
    Full(Vec<Move>),
    Clear,
}

#[derive(Debug, Clone)]
pub struct MoveLedgerReplicator {
    list: ReplicatedMoveList,
    mirror_epoch: u32,
}

impl MoveLedgerReplicator {
    pub fn new(object: ObjectId, channel: ChannelId) -> Self {
        Self {
            list: ReplicatedMoveList::new(object, channel),
            mirror_epoch: 0,
        }
    }

    #[inline]
    pub fn mirror(&self) -> &[u16] {
        self.list.values()
    }

    #[inline]
    pub fn mirror_len(&self) -> usize {
        self.list.len()
    }

    pub fn mirror_moves(&self) -> Vec<Move> {
        self.list.values().iter().copied().map(Move::from_wire).collect()
    }

    #[inline]
    pub fn mirror_epoch(&self) -> u32 {
        self.mirror_epoch
    }

    /// Record which game the replicated list belongs to.
    pub fn set_mirror_epoch(&mut self, epoch: u32) {
        self.mirror_epoch = epoch;
    }

    /// Whether `local` matches the mirror entry for entry.
    pub fn is_synced_with(&self, local: &[Move]) -> bool {
        local.len() == self.list.len()
            && local
                .iter()
                .zip(self.list.values())
                .all(|(mv, wire)| mv.wire() == *wire)
    }

    /// Owner side: queue the edits that bring the mirror to `local`.
    /// Returns whether anything was pushed.
    pub fn push_diff(&mut self, local: &[Move], epoch: u32) -> bool {
        let mut pushed = false;

        if epoch != self.mirror_epoch {
            self.list.clear();
            self.mirror_epoch = epoch;
            pushed = true;
        }

        let common = common_prefix(local, self.list.values());
        while self.list.len() > common {
            self.list.remove_last();
            pushed = true;
        }
        for mv in &local[common..] {
            self.list.push(mv.wire());
            pushed = true;
        }

        if pushed {
            debug!(len = local.len(), epoch, "ledger diff pushed");
        }
        pushed
    }

    pub fn drain_commands(&mut self) -> Vec<NetCommand> {
        self.list.drain_commands()
    }

    /// Observer side: fold a list event into the mirror.
    pub fn apply_event(&mut self, local_id: ParticipantId, event: &NetEvent) -> Option<LedgerDiff> {
        let diff = match self.list.apply_event(local_id, event)? {
            ListDelta::Added { index, value } => LedgerDiff::Append {
                index,
                mv: Move::from_wire(value),
            },
            ListDelta::Removed { index, value } => LedgerDiff::RemoveAt {
                index,
                mv: Move::from_wire(value),
            },
            ListDelta::Cleared => LedgerDiff::Clear,
            ListDelta::Full(values) => {
                LedgerDiff::Full(values.into_iter().map(Move::from_wire).collect())
            }
        };
        Some(diff)
    }
}

/// Length of the longest shared prefix of a ledger and a wire list.
pub fn common_prefix(local: &[Move], wire: &[u16]) -> usize {
    local
        .iter()
        .zip(wire)
        .take_while(|(mv, value)| mv.wire() == **value)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::move_descriptions::MoveKind;

    fn e4() -> Move {
        Move::new(12, 28, MoveKind::PawnDoubleStep)
    }

    fn e5() -> Move {
        Move::new(52, 36, MoveKind::PawnDoubleStep)
    }

    #[test]
    fn longer_ledger_appends_in_order() {
        let mut ledger = MoveLedgerReplicator::new(1, 3);
        assert!(ledger.push_diff(&[e4(), e5()], 0));
        assert_eq!(ledger.mirror(), &[e4().wire(), e5().wire()]);
        let commands = ledger.drain_commands();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[1], NetCommand::ListAdd { value, .. } if value == e5().wire()));

        assert!(!ledger.push_diff(&[e4(), e5()], 0));
        assert!(ledger.drain_commands().is_empty());
    }

    #[test]
    fn shorter_ledger_removes_from_the_tail() {
        let mut ledger = MoveLedgerReplicator::new(1, 3);
        ledger.push_diff(&[e4(), e5()], 0);
        ledger.drain_commands();

        assert!(ledger.push_diff(&[], 0));
        assert_eq!(
            ledger.drain_commands(),
            vec![
                NetCommand::ListRemoveAt {
                    object: 1,
                    channel: 3,
                    index: 1
                },
                NetCommand::ListRemoveAt {
                    object: 1,
                    channel: 3,
                    index: 0
                },
            ]
        );
    }

    #[test]
    fn new_epoch_clears_then_republishes() {
        let mut ledger = MoveLedgerReplicator::new(1, 3);
        ledger.push_diff(&[e4()], 1);
        ledger.drain_commands();

        assert!(ledger.push_diff(&[e4()], 2));
        let commands = ledger.drain_commands();
        assert_eq!(commands[0], NetCommand::ListClear { object: 1, channel: 3 });
        assert!(matches!(commands[1], NetCommand::ListAdd { .. }));
        assert_eq!(ledger.mirror_epoch(), 2);
    }

    #[test]
    fn observer_events_become_ledger_diffs() {
        let mut ledger = MoveLedgerReplicator::new(1, 3);
        let diff = ledger.apply_event(
            2,
            &NetEvent::ListAdd {
                object: 1,
                channel: 3,
                origin: 1,
                index: 0,
                value: e4().wire(),
            },
        );
        assert_eq!(diff, Some(LedgerDiff::Append { index: 0, mv: e4() }));
        assert!(ledger.is_synced_with(&[e4()]));
        assert!(!ledger.is_synced_with(&[e5()]));
    }
}
