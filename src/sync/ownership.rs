//! Claimable ownership of shared objects.
//!
//! Each participant keeps one `OwnershipAuthority` per claimable object. A
//! claim sets the local flag right away and asks the authority host for the
//! object; the replicated claimed flag then tells everyone else the object is
//! taken. Releases go back through the host, which only honours them from the
//! current owner.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::sync::transport::{NetCommand, NetEvent, ObjectId, ParticipantId, SERVER_ID};

/// How a replicated transfer affected this participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipTransition {
    Gained,
    Lost,
}

/// What the session needs from the token it mutates under.
pub trait OwnershipGate {
    /// Try to take the token. `false` when someone else holds it.
    fn claim(&mut self) -> bool;

    /// Whether this participant currently holds, or is acquiring, the token.
    fn holds(&self) -> bool;
}

/// Gate for single-participant play and tests: always granted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoloGate;

impl OwnershipGate for SoloGate {
    fn claim(&mut self) -> bool {
        true
    }

    fn holds(&self) -> bool {
        true
    }
}

/// Seconds after a release during which a replicated-only claim is not
/// released again.
const RE_RELEASE_GUARD_S: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct OwnershipAuthority {
    object: ObjectId,
    local_id: ParticipantId,
    server_id: ParticipantId,

    local_claimed: bool,
    replicated_claimed: bool,
    owner: ParticipantId,

    release_timer_s: f64,
    release_delay_s: f64,
    tick_delta_s: f64,
    elapsed_s: f64,
    last_release_at: Option<f64>,

    hold_override: bool,
    interacting: bool,
    claimed_by_proxy: bool,
    proxies: Vec<ObjectId>,

    outbox: Vec<NetCommand>,
}

impl OwnershipAuthority {
    pub fn new(
        object: ObjectId,
        local_id: ParticipantId,
        release_delay_s: f64,
        tick_delta_s: f64,
    ) -> Self {
        Self {
            object,
            local_id,
            server_id: SERVER_ID,
            local_claimed: false,
            replicated_claimed: false,
            owner: SERVER_ID,
            release_timer_s: 0.0,
            release_delay_s: release_delay_s.max(0.0),
            tick_delta_s: tick_delta_s.max(0.0),
            elapsed_s: 0.0,
            last_release_at: None,
            hold_override: false,
            interacting: false,
            claimed_by_proxy: false,
            proxies: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn with_server_id(mut self, server_id: ParticipantId) -> Self {
        self.server_id = server_id;
        self
    }

    #[inline]
    pub fn object(&self) -> ObjectId {
        self.object
    }

    #[inline]
    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    /// Confirmed owner according to the last replicated transfer.
    #[inline]
    pub fn is_owner(&self) -> bool {
        self.owner == self.local_id
    }

    #[inline]
    pub fn is_claimed_locally(&self) -> bool {
        self.local_claimed || (self.is_owner() && self.replicated_claimed)
    }

    #[inline]
    pub fn is_claimed(&self) -> bool {
        self.is_claimed_locally() || self.replicated_claimed
    }

    #[inline]
    pub fn is_owned_remotely(&self) -> bool {
        !self.is_claimed_locally() && self.replicated_claimed
    }

    #[inline]
    pub fn is_claimed_by_proxy(&self) -> bool {
        self.claimed_by_proxy
    }

    pub fn set_hold_override(&mut self, hold: bool) {
        self.hold_override = hold;
    }

    pub fn set_interacting(&mut self, interacting: bool) {
        self.interacting = interacting;
    }

    #[inline]
    pub fn should_hold(&self) -> bool {
        self.claimed_by_proxy || self.hold_override || self.interacting
    }

    pub fn claim(&mut self) {
        self.release_timer_s = 0.0;

        // Keep asking until the replicated flag comes back set.
        if self.replicated_claimed {
            return;
        }

        self.local_claimed = true;
        let already_requested = self
            .outbox
            .iter()
            .any(|c| matches!(c, NetCommand::ChangeOwnership { .. }));
        if !already_requested {
            self.outbox.push(NetCommand::ChangeOwnership {
                object: self.object,
            });
        }
    }

    /// Release the token and hand back the proxies this object was holding.
    pub fn release(&mut self) -> Vec<ObjectId> {
        let released_recently = self
            .last_release_at
            .is_some_and(|at| self.elapsed_s - at <= RE_RELEASE_GUARD_S);
        if self.local_claimed || (self.is_claimed_locally() && !released_recently) {
            self.execute_release();
        }

        let object = self.object;
        std::mem::take(&mut self.proxies)
            .into_iter()
            .filter(|proxy| *proxy != object)
            .collect()
    }

    fn execute_release(&mut self) {
        self.local_claimed = false;
        self.drop_claim_requests();
        self.outbox.push(NetCommand::RemoveOwnership {
            object: self.object,
        });
        self.last_release_at = Some(self.elapsed_s);
        self.release_timer_s = 0.0;
        debug!(object = self.object, participant = self.local_id, "ownership released");
    }

    /// One replication tick. Returns proxies freed by a release.
    pub fn on_tick(&mut self) -> Vec<ObjectId> {
        self.elapsed_s += self.tick_delta_s;

        if self.should_hold() {
            self.claim();
            return Vec::new();
        }

        if !self.is_claimed_locally() {
            return Vec::new();
        }

        // Always wait at least one tick before letting go.
        if self.release_timer_s > self.release_delay_s + self.tick_delta_s {
            return self.release();
        }

        self.release_timer_s += self.tick_delta_s;
        Vec::new()
    }

    pub fn apply_event(&mut self, event: &NetEvent) -> Option<OwnershipTransition> {
        let NetEvent::OwnershipChanged {
            object,
            owner,
            claimed,
        } = *event
        else {
            return None;
        };
        if object != self.object {
            return None;
        }

        let was_owner = self.is_owner();
        self.owner = owner;
        self.replicated_claimed = claimed;

        if self.is_owner() && !was_owner {
            // A holder that vanished leaves its claim behind; the server
            // inherits the object and is the one to clear it.
            if self.local_id == self.server_id && !self.local_claimed && claimed {
                self.outbox.push(NetCommand::ClearClaim {
                    object: self.object,
                });
            }
            self.release_timer_s = 0.0;
            info!(object, participant = self.local_id, "ownership gained");
            return Some(OwnershipTransition::Gained);
        }

        if !self.is_owner() && was_owner {
            self.local_claimed = false;
            self.drop_claim_requests();
            info!(object, participant = self.local_id, owner, "ownership lost");
            return Some(OwnershipTransition::Lost);
        }

        None
    }

    pub fn drain_commands(&mut self) -> Vec<NetCommand> {
        std::mem::take(&mut self.outbox)
    }

    fn drop_claim_requests(&mut self) {
        self.outbox
            .retain(|c| !matches!(c, NetCommand::ChangeOwnership { .. }));
    }
}

impl OwnershipGate for OwnershipAuthority {
    fn claim(&mut self) -> bool {
        OwnershipAuthority::claim(self);
        !self.is_owned_remotely()
    }

    fn holds(&self) -> bool {
        self.is_claimed_locally()
    }
}

/// All claimable objects of one participant, so proxy claims can be
/// resolved and released by id.
#[derive(Debug, Clone, Default)]
pub struct OwnershipRegistry {
    objects: BTreeMap<ObjectId, OwnershipAuthority>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, authority: OwnershipAuthority) {
        self.objects.insert(authority.object(), authority);
    }

    pub fn get(&self, object: ObjectId) -> Option<&OwnershipAuthority> {
        self.objects.get(&object)
    }

    pub fn object_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    pub fn get_mut(&mut self, object: ObjectId) -> Option<&mut OwnershipAuthority> {
        self.objects.get_mut(&object)
    }

    /// Claim `target` on behalf of `claimer`, unless it is already claimed.
    pub fn claim_by_proxy(&mut self, claimer: ObjectId, target: ObjectId) -> bool {
        if claimer == target || !self.objects.contains_key(&claimer) {
            return false;
        }
        let Some(authority) = self.objects.get_mut(&target) else {
            return false;
        };
        if authority.is_claimed() {
            return false;
        }
        authority.claim();
        authority.claimed_by_proxy = true;

        if let Some(claimer) = self.objects.get_mut(&claimer) {
            claimer.proxies.push(target);
        }
        true
    }

    /// Release `object` and, transitively, everything it claimed by proxy.
    pub fn release(&mut self, object: ObjectId) {
        let freed = match self.objects.get_mut(&object) {
            Some(authority) => authority.release(),
            None => return,
        };
        self.release_proxies(freed);
    }

    fn release_proxies(&mut self, mut pending: Vec<ObjectId>) {
        while let Some(proxy) = pending.pop() {
            if let Some(authority) = self.objects.get_mut(&proxy) {
                pending.extend(authority.release());
                authority.claimed_by_proxy = false;
            }
        }
    }

    pub fn on_tick(&mut self) {
        let mut freed = Vec::new();
        for authority in self.objects.values_mut() {
            freed.extend(authority.on_tick());
        }
        self.release_proxies(freed);
    }

    pub fn apply_event(&mut self, event: &NetEvent) -> Option<(ObjectId, OwnershipTransition)> {
        let NetEvent::OwnershipChanged { object, .. } = event else {
            return None;
        };
        let authority = self.objects.get_mut(object)?;
        authority.apply_event(event).map(|t| (*object, t))
    }

    pub fn drain_commands(&mut self) -> Vec<NetCommand> {
        self.objects
            .values_mut()
            .flat_map(OwnershipAuthority::drain_commands)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::local_network::{LocalLink, LocalNetwork};
    use crate::sync::transport::PeerLink;

    const BOARD: ObjectId = 1;
    const TICK: f64 = 1.0 / 30.0;

    struct Claimer {
        link: LocalLink,
        authority: OwnershipAuthority,
    }

    impl Claimer {
        fn new(network: &LocalNetwork, id: ParticipantId) -> Self {
            Self {
                link: network.connect(id),
                authority: OwnershipAuthority::new(BOARD, id, 0.0, TICK),
            }
        }

        fn pump(&mut self) -> Vec<OwnershipTransition> {
            let mut transitions = Vec::new();
            while let Some(event) = self.link.poll() {
                transitions.extend(self.authority.apply_event(&event));
            }
            transitions
        }

        fn send(&mut self) {
            for command in self.authority.drain_commands() {
                self.link.send(command).expect("send should succeed");
            }
        }
    }

    #[test]
    fn simultaneous_claims_leave_exactly_one_holder() {
        let network = LocalNetwork::new();
        let mut claimers: Vec<_> = (1..=4).map(|id| Claimer::new(&network, id)).collect();

        for claimer in &mut claimers {
            assert!(OwnershipGate::claim(&mut claimer.authority));
            claimer.send();
        }
        network.flush();
        for claimer in &mut claimers {
            claimer.pump();
        }

        let holders: Vec<_> = claimers
            .iter()
            .filter(|c| c.authority.is_claimed_locally())
            .map(|c| c.link.local_id())
            .collect();
        assert_eq!(holders, vec![4]);
        assert!(claimers[..3].iter().all(|c| c.authority.is_owned_remotely()));

        // Further claims by the losers are silent no-ops.
        assert!(!OwnershipGate::claim(&mut claimers[0].authority));
        assert!(claimers[0].authority.drain_commands().is_empty());
    }

    #[test]
    fn superseded_claimer_sees_a_loss() {
        let network = LocalNetwork::new();
        let mut a = Claimer::new(&network, 1);
        let mut b = Claimer::new(&network, 2);

        a.authority.claim();
        a.send();
        b.authority.claim();
        b.send();
        network.flush();

        assert_eq!(
            a.pump(),
            vec![OwnershipTransition::Gained, OwnershipTransition::Lost]
        );
        assert_eq!(b.pump(), vec![OwnershipTransition::Gained]);
    }

    #[test]
    fn release_waits_for_delay_plus_one_tick() {
        let network = LocalNetwork::new();
        let mut a = Claimer::new(&network, 1);
        a.authority.claim();
        a.send();
        network.flush();
        a.pump();
        assert!(a.authority.is_claimed_locally());

        // Timer goes 0 -> 1 tick -> 2 ticks, then releases.
        for _ in 0..2 {
            a.authority.on_tick();
            assert!(a.authority.drain_commands().is_empty());
        }
        a.authority.on_tick();
        let commands = a.authority.drain_commands();
        assert_eq!(commands, vec![NetCommand::RemoveOwnership { object: BOARD }]);
        for command in commands {
            a.link.send(command).expect("send should succeed");
        }

        network.flush();
        assert_eq!(a.pump(), vec![OwnershipTransition::Lost]);
        assert_eq!(a.authority.owner(), SERVER_ID);
        assert!(!a.authority.is_claimed());
    }

    #[test]
    fn holding_keeps_the_claim() {
        let mut authority = OwnershipAuthority::new(BOARD, 1, 0.0, TICK);
        authority.set_hold_override(true);
        for _ in 0..10 {
            authority.on_tick();
        }
        assert_eq!(
            authority.drain_commands(),
            vec![NetCommand::ChangeOwnership { object: BOARD }]
        );
        assert!(authority.is_claimed_locally());
    }

    #[test]
    fn server_clears_a_claim_left_by_a_disconnected_holder() {
        let network = LocalNetwork::new();
        let mut server = Claimer::new(&network, SERVER_ID);
        let mut client = Claimer::new(&network, 7);

        client.authority.claim();
        client.send();
        network.flush();
        client.pump();
        server.pump();
        assert!(server.authority.is_owned_remotely());

        network.disconnect(7);
        assert_eq!(server.pump(), vec![OwnershipTransition::Gained]);
        server.send();
        network.flush();
        server.pump();
        assert!(!network.is_claimed(BOARD));
        assert!(!server.authority.is_claimed());
    }

    #[test]
    fn proxy_claims_cascade_on_release() {
        let mut registry = OwnershipRegistry::new();
        for object in [1, 2, 3] {
            registry.register(OwnershipAuthority::new(object, 1, 0.0, TICK));
        }
        if let Some(board) = registry.get_mut(1) {
            board.claim();
        }
        assert!(registry.claim_by_proxy(1, 2));
        assert!(registry.claim_by_proxy(2, 3));
        assert!(!registry.claim_by_proxy(1, 3), "already claimed");
        assert!(!registry.claim_by_proxy(1, 1));
        registry.drain_commands();

        registry.release(1);
        for object in [1, 2, 3] {
            let authority = registry.get(object).expect("registered");
            assert!(!authority.is_claimed_locally(), "object {object} still claimed");
            assert!(!authority.is_claimed_by_proxy());
        }
        let releases = registry
            .drain_commands()
            .into_iter()
            .filter(|c| matches!(c, NetCommand::RemoveOwnership { .. }))
            .count();
        assert_eq!(releases, 3);
    }
}
