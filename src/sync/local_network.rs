//! Deterministic in-process transport.
//!
//! Every participant gets a `LocalLink` sharing one hub. Commands queue up
//! until `flush`, which feeds them to the authority in send order and fans
//! the resulting events out to the participants' inboxes.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use tracing::trace;

use crate::errors::SyncError;
use crate::sync::transport::{
    AuthorityHost, Delivery, NetCommand, NetEvent, ObjectId, ParticipantId, PeerLink, Recipient,
};

#[derive(Default)]
struct Hub {
    host: AuthorityHost,
    inboxes: BTreeMap<ParticipantId, VecDeque<NetEvent>>,
    commands: VecDeque<(ParticipantId, NetCommand)>,
}

impl Hub {
    fn deliver(&mut self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            match delivery.to {
                Recipient::All => {
                    for inbox in self.inboxes.values_mut() {
                        inbox.push_back(delivery.event.clone());
                    }
                }
                Recipient::Only(participant) => {
                    if let Some(inbox) = self.inboxes.get_mut(&participant) {
                        inbox.push_back(delivery.event);
                    }
                }
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct LocalNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl LocalNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `participant`; its inbox starts with the join snapshot.
    pub fn connect(&self, participant: ParticipantId) -> LocalLink {
        let mut hub = self.hub.borrow_mut();
        hub.inboxes.insert(participant, VecDeque::new());
        let snapshot = hub.host.connect(participant);
        hub.deliver(snapshot);
        LocalLink {
            id: participant,
            hub: Rc::clone(&self.hub),
        }
    }

    pub fn disconnect(&self, participant: ParticipantId) {
        let mut hub = self.hub.borrow_mut();
        hub.inboxes.remove(&participant);
        hub.commands.retain(|(from, _)| *from != participant);
        let deliveries = hub.host.disconnect(participant);
        hub.deliver(deliveries);
    }

    /// Process every queued command. Returns how many were handled.
    pub fn flush(&self) -> usize {
        let mut hub = self.hub.borrow_mut();
        let mut handled = 0;
        while let Some((from, command)) = hub.commands.pop_front() {
            trace!(from, ?command, "local network command");
            let deliveries = hub.host.handle(from, command);
            hub.deliver(deliveries);
            handled += 1;
        }
        handled
    }

    pub fn pending_commands(&self) -> usize {
        self.hub.borrow().commands.len()
    }

    pub fn owner_of(&self, object: ObjectId) -> ParticipantId {
        self.hub.borrow().host.owner_of(object)
    }

    pub fn is_claimed(&self, object: ObjectId) -> bool {
        self.hub.borrow().host.is_claimed(object)
    }
}

pub struct LocalLink {
    id: ParticipantId,
    hub: Rc<RefCell<Hub>>,
}

impl PeerLink for LocalLink {
    fn local_id(&self) -> ParticipantId {
        self.id
    }

    fn send(&mut self, command: NetCommand) -> Result<(), SyncError> {
        let mut hub = self.hub.borrow_mut();
        if !hub.host.is_connected(self.id) {
            return Err(SyncError::Disconnected);
        }
        hub.commands.push_back((self.id, command));
        Ok(())
    }

    fn poll(&mut self) -> Option<NetEvent> {
        self.hub
            .borrow_mut()
            .inboxes
            .get_mut(&self.id)
            .and_then(VecDeque::pop_front)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_handled_in_send_order() {
        let network = LocalNetwork::new();
        let mut a = network.connect(1);
        let mut b = network.connect(2);

        a.send(NetCommand::ChangeOwnership { object: 1 }).expect("send should succeed");
        b.send(NetCommand::ChangeOwnership { object: 1 }).expect("send should succeed");
        assert_eq!(network.pending_commands(), 2);
        assert_eq!(network.flush(), 2);
        assert_eq!(network.owner_of(1), 2);

        let seen: Vec<_> = std::iter::from_fn(|| a.poll()).collect();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[1], NetEvent::OwnershipChanged { owner: 2, .. }));
    }

    #[test]
    fn disconnected_link_cannot_send() {
        let network = LocalNetwork::new();
        let mut a = network.connect(1);
        network.disconnect(1);
        assert!(matches!(
            a.send(NetCommand::ClearClaim { object: 1 }),
            Err(SyncError::Disconnected)
        ));
        assert!(a.poll().is_none());
    }
}
