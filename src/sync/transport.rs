//! Replication primitives shared by every transport.
//!
//! Participants talk to one authority through `NetCommand`s and observe the
//! replicated world through `NetEvent`s. The authority itself is the
//! transport-independent `AuthorityHost`; transports only move commands in
//! and deliveries out.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub type ParticipantId = u64;
pub type ObjectId = u32;
pub type ChannelId = u16;

/// The server participant. Ownership returns here on release.
pub const SERVER_ID: ParticipantId = 0;

/// Origin used for join snapshots and rejected-write corrections, so no
/// participant mistakes them for an echo of its own write.
pub const SNAPSHOT_ORIGIN: ParticipantId = ParticipantId::MAX;

/// Requests sent by a participant. The requester is always the sending link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetCommand {
    ChangeOwnership {
        object: ObjectId,
    },
    RemoveOwnership {
        object: ObjectId,
    },
    ClearClaim {
        object: ObjectId,
    },
    SetVar {
        object: ObjectId,
        channel: ChannelId,
        payload: Vec<u8>,
    },
    /// `index` is where the writer expects the value to land.
    ListAdd {
        object: ObjectId,
        channel: ChannelId,
        index: u32,
        value: u16,
    },
    ListRemoveAt {
        object: ObjectId,
        channel: ChannelId,
        index: u32,
    },
    ListClear {
        object: ObjectId,
        channel: ChannelId,
    },
}

impl NetCommand {
    pub fn object(&self) -> ObjectId {
        match self {
            NetCommand::ChangeOwnership { object }
            | NetCommand::RemoveOwnership { object }
            | NetCommand::ClearClaim { object }
            | NetCommand::SetVar { object, .. }
            | NetCommand::ListAdd { object, .. }
            | NetCommand::ListRemoveAt { object, .. }
            | NetCommand::ListClear { object, .. } => *object,
        }
    }
}

/// Replicated state changes as observed by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetEvent {
    OwnershipChanged {
        object: ObjectId,
        owner: ParticipantId,
        claimed: bool,
    },
    VarChanged {
        object: ObjectId,
        channel: ChannelId,
        origin: ParticipantId,
        payload: Vec<u8>,
    },
    ListAdd {
        object: ObjectId,
        channel: ChannelId,
        origin: ParticipantId,
        index: u32,
        value: u16,
    },
    /// Carries the removed value so observers can check their tail.
    ListRemoveAt {
        object: ObjectId,
        channel: ChannelId,
        origin: ParticipantId,
        index: u32,
        value: u16,
    },
    ListClear {
        object: ObjectId,
        channel: ChannelId,
        origin: ParticipantId,
    },
    ListFull {
        object: ObjectId,
        channel: ChannelId,
        values: Vec<u16>,
    },
}

/// One participant's connection to the authority.
pub trait PeerLink {
    fn local_id(&self) -> ParticipantId;

    fn server_id(&self) -> ParticipantId {
        SERVER_ID
    }

    fn send(&mut self, command: NetCommand) -> Result<(), crate::errors::SyncError>;

    fn poll(&mut self) -> Option<NetEvent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Only(ParticipantId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: Recipient,
    pub event: NetEvent,
}

impl Delivery {
    fn all(event: NetEvent) -> Self {
        Self {
            to: Recipient::All,
            event,
        }
    }

    fn only(participant: ParticipantId, event: NetEvent) -> Self {
        Self {
            to: Recipient::Only(participant),
            event,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OwnershipRecord {
    owner: ParticipantId,
    claimed: bool,
}

impl Default for OwnershipRecord {
    fn default() -> Self {
        Self {
            owner: SERVER_ID,
            claimed: false,
        }
    }
}

/// Authority-side state: object ownership, replicated scalars and lists.
///
/// Writes are accepted only from the current owner of the target object.
/// Objects come into existence on first use, owned by the server and
/// unclaimed.
#[derive(Debug, Default)]
pub struct AuthorityHost {
    participants: BTreeSet<ParticipantId>,
    ownership: BTreeMap<ObjectId, OwnershipRecord>,
    vars: BTreeMap<(ObjectId, ChannelId), Vec<u8>>,
    lists: BTreeMap<(ObjectId, ChannelId), Vec<u16>>,
}

impl AuthorityHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().copied()
    }

    pub fn is_connected(&self, participant: ParticipantId) -> bool {
        self.participants.contains(&participant)
    }

    pub fn owner_of(&self, object: ObjectId) -> ParticipantId {
        self.record(object).owner
    }

    pub fn is_claimed(&self, object: ObjectId) -> bool {
        self.record(object).claimed
    }

    pub fn list(&self, object: ObjectId, channel: ChannelId) -> &[u16] {
        self.lists
            .get(&(object, channel))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn record(&self, object: ObjectId) -> OwnershipRecord {
        self.ownership.get(&object).copied().unwrap_or_default()
    }

    /// Register `participant` and build its join snapshot.
    pub fn connect(&mut self, participant: ParticipantId) -> Vec<Delivery> {
        self.participants.insert(participant);
        debug!(participant, "participant connected");

        let mut snapshot = Vec::new();
        for (object, record) in &self.ownership {
            snapshot.push(Delivery::only(
                participant,
                NetEvent::OwnershipChanged {
                    object: *object,
                    owner: record.owner,
                    claimed: record.claimed,
                },
            ));
        }
        for ((object, channel), payload) in &self.vars {
            snapshot.push(Delivery::only(
                participant,
                NetEvent::VarChanged {
                    object: *object,
                    channel: *channel,
                    origin: SNAPSHOT_ORIGIN,
                    payload: payload.clone(),
                },
            ));
        }
        for ((object, channel), values) in &self.lists {
            snapshot.push(Delivery::only(
                participant,
                NetEvent::ListFull {
                    object: *object,
                    channel: *channel,
                    values: values.clone(),
                },
            ));
        }
        snapshot
    }

    /// Drop `participant`; anything it owned reverts to the server.
    ///
    /// The claimed flag is left set for the server participant to clear when
    /// it observes the transfer. With no server participant attached the
    /// host clears it itself.
    pub fn disconnect(&mut self, participant: ParticipantId) -> Vec<Delivery> {
        if !self.participants.remove(&participant) {
            return Vec::new();
        }
        debug!(participant, "participant disconnected");

        let server_attached = self.participants.contains(&SERVER_ID);
        let mut out = Vec::new();
        for (object, record) in self.ownership.iter_mut() {
            if record.owner != participant {
                continue;
            }
            record.owner = SERVER_ID;
            if !server_attached {
                record.claimed = false;
            }
            out.push(Delivery::all(NetEvent::OwnershipChanged {
                object: *object,
                owner: record.owner,
                claimed: record.claimed,
            }));
        }
        out
    }

    pub fn handle(&mut self, from: ParticipantId, command: NetCommand) -> Vec<Delivery> {
        match command {
            NetCommand::ChangeOwnership { object } => {
                let record = self.ownership.entry(object).or_default();
                record.owner = from;
                record.claimed = true;
                debug!(object, owner = from, "ownership changed");
                vec![Delivery::all(NetEvent::OwnershipChanged {
                    object,
                    owner: from,
                    claimed: true,
                })]
            }
            NetCommand::RemoveOwnership { object } => {
                let record = self.ownership.entry(object).or_default();
                if record.owner != from {
                    debug!(object, from, owner = record.owner, "stale release ignored");
                    return Vec::new();
                }
                record.owner = SERVER_ID;
                record.claimed = false;
                vec![Delivery::all(NetEvent::OwnershipChanged {
                    object,
                    owner: SERVER_ID,
                    claimed: false,
                })]
            }
            NetCommand::ClearClaim { object } => {
                let record = self.ownership.entry(object).or_default();
                if record.owner != from || !record.claimed {
                    return Vec::new();
                }
                record.claimed = false;
                vec![Delivery::all(NetEvent::OwnershipChanged {
                    object,
                    owner: record.owner,
                    claimed: false,
                })]
            }
            NetCommand::SetVar {
                object,
                channel,
                payload,
            } => {
                if self.owner_of(object) != from {
                    warn!(object, channel, from, "var write from non-owner rejected");
                    return self
                        .vars
                        .get(&(object, channel))
                        .map(|current| {
                            vec![Delivery::only(
                                from,
                                NetEvent::VarChanged {
                                    object,
                                    channel,
                                    origin: SNAPSHOT_ORIGIN,
                                    payload: current.clone(),
                                },
                            )]
                        })
                        .unwrap_or_default();
                }
                self.vars.insert((object, channel), payload.clone());
                vec![Delivery::all(NetEvent::VarChanged {
                    object,
                    channel,
                    origin: from,
                    payload,
                })]
            }
            NetCommand::ListAdd {
                object,
                channel,
                index,
                value,
            } => {
                if self.owner_of(object) != from {
                    return self.reject_list_write(from, object, channel);
                }
                if index as usize != self.list(object, channel).len() {
                    warn!(object, channel, index, "list add at a stale index");
                    return self.reject_list_write(from, object, channel);
                }
                let list = self.lists.entry((object, channel)).or_default();
                list.push(value);
                vec![Delivery::all(NetEvent::ListAdd {
                    object,
                    channel,
                    origin: from,
                    index: (list.len() - 1) as u32,
                    value,
                })]
            }
            NetCommand::ListRemoveAt {
                object,
                channel,
                index,
            } => {
                if self.owner_of(object) != from {
                    return self.reject_list_write(from, object, channel);
                }
                let at = index as usize;
                if at + 1 != self.list(object, channel).len() {
                    warn!(object, channel, index, "list removal away from the tail");
                    return self.reject_list_write(from, object, channel);
                }
                let list = self.lists.entry((object, channel)).or_default();
                let value = list.remove(at);
                vec![Delivery::all(NetEvent::ListRemoveAt {
                    object,
                    channel,
                    origin: from,
                    index,
                    value,
                })]
            }
            NetCommand::ListClear { object, channel } => {
                if self.owner_of(object) != from {
                    return self.reject_list_write(from, object, channel);
                }
                self.lists.entry((object, channel)).or_default().clear();
                vec![Delivery::all(NetEvent::ListClear {
                    object,
                    channel,
                    origin: from,
                })]
            }
        }
    }

    fn reject_list_write(
        &self,
        from: ParticipantId,
        object: ObjectId,
        channel: ChannelId,
    ) -> Vec<Delivery> {
        warn!(object, channel, from, "list write rejected");
        vec![Delivery::only(
            from,
            NetEvent::ListFull {
                object,
                channel,
                values: self.list(object, channel).to_vec(),
            },
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: ObjectId = 1;

    #[test]
    fn last_ownership_request_wins() {
        let mut host = AuthorityHost::new();
        host.connect(1);
        host.connect(2);

        host.handle(1, NetCommand::ChangeOwnership { object: BOARD });
        host.handle(2, NetCommand::ChangeOwnership { object: BOARD });
        assert_eq!(host.owner_of(BOARD), 2);
        assert!(host.is_claimed(BOARD));

        // A release from the previous holder is ignored.
        assert!(host
            .handle(1, NetCommand::RemoveOwnership { object: BOARD })
            .is_empty());
        assert_eq!(host.owner_of(BOARD), 2);

        host.handle(2, NetCommand::RemoveOwnership { object: BOARD });
        assert_eq!(host.owner_of(BOARD), SERVER_ID);
        assert!(!host.is_claimed(BOARD));
    }

    #[test]
    fn non_owner_list_write_gets_a_correction() {
        let mut host = AuthorityHost::new();
        host.connect(1);
        host.connect(2);
        host.handle(1, NetCommand::ChangeOwnership { object: BOARD });
        host.handle(
            1,
            NetCommand::ListAdd {
                object: BOARD,
                channel: 3,
                index: 0,
                value: 42,
            },
        );

        let out = host.handle(
            2,
            NetCommand::ListAdd {
                object: BOARD,
                channel: 3,
                index: 1,
                value: 7,
            },
        );
        assert_eq!(
            out,
            vec![Delivery::only(
                2,
                NetEvent::ListFull {
                    object: BOARD,
                    channel: 3,
                    values: vec![42],
                }
            )]
        );
        assert_eq!(host.list(BOARD, 3), &[42]);
    }

    #[test]
    fn stale_list_index_from_the_owner_is_corrected() {
        let mut host = AuthorityHost::new();
        host.connect(1);
        host.handle(1, NetCommand::ChangeOwnership { object: BOARD });
        let add = |index, value| NetCommand::ListAdd {
            object: BOARD,
            channel: 3,
            index,
            value,
        };
        host.handle(1, add(0, 11));

        let out = host.handle(1, add(0, 12));
        assert!(matches!(&out[..], [Delivery { event: NetEvent::ListFull { values, .. }, .. }] if values == &[11]));
        let out = host.handle(
            1,
            NetCommand::ListRemoveAt {
                object: BOARD,
                channel: 3,
                index: 5,
            },
        );
        assert!(matches!(&out[..], [Delivery { event: NetEvent::ListFull { .. }, .. }]));
        assert_eq!(host.list(BOARD, 3), &[11]);
    }

    #[test]
    fn disconnect_reverts_to_server_and_keeps_claim_when_server_attached() {
        let mut host = AuthorityHost::new();
        host.connect(SERVER_ID);
        host.connect(5);
        host.handle(5, NetCommand::ChangeOwnership { object: BOARD });

        let out = host.disconnect(5);
        assert_eq!(out.len(), 1);
        assert_eq!(host.owner_of(BOARD), SERVER_ID);
        assert!(host.is_claimed(BOARD));

        host.handle(SERVER_ID, NetCommand::ClearClaim { object: BOARD });
        assert!(!host.is_claimed(BOARD));
    }

    #[test]
    fn disconnect_without_server_clears_claim() {
        let mut host = AuthorityHost::new();
        host.connect(5);
        host.handle(5, NetCommand::ChangeOwnership { object: BOARD });
        host.disconnect(5);
        assert!(!host.is_claimed(BOARD));
    }

    #[test]
    fn join_snapshot_lists_ownership_vars_then_lists() {
        let mut host = AuthorityHost::new();
        host.connect(1);
        host.handle(1, NetCommand::ChangeOwnership { object: BOARD });
        host.handle(
            1,
            NetCommand::SetVar {
                object: BOARD,
                channel: 0,
                payload: b"1".to_vec(),
            },
        );
        host.handle(
            1,
            NetCommand::ListAdd {
                object: BOARD,
                channel: 3,
                index: 0,
                value: 9,
            },
        );

        let snapshot = host.connect(2);
        assert_eq!(snapshot.len(), 3);
        assert!(matches!(
            snapshot[0].event,
            NetEvent::OwnershipChanged { owner: 1, claimed: true, .. }
        ));
        assert!(matches!(
            snapshot[1].event,
            NetEvent::VarChanged { origin: SNAPSHOT_ORIGIN, .. }
        ));
        assert!(matches!(&snapshot[2].event, NetEvent::ListFull { values, .. } if values == &[9]));
        assert!(snapshot.iter().all(|d| d.to == Recipient::Only(2)));
    }
}
