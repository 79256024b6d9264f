//! One participant's replicated chess board.
//!
//! `NetworkBoard` glues a `ChessSession` to a `PeerLink`: incoming events are
//! folded into the session, and while this participant holds the board token
//! every replication tick pushes the board state, the ledger diff, the turn
//! and the clock, in that order. Losing the token with unpublished moves
//! rolls the session back to the replicated state.

use tracing::{debug, error, info};

use crate::config::SessionConfig;
use crate::errors::{SessionError, SyncError};
use crate::game_state::chess_types::{Color, Square};
use crate::moves::move_descriptions::Move;
use crate::session::chess_session::ChessSession;
use crate::session::events::SessionEvent;
use crate::session::options::{BoardStateMessage, GameMode, OptionState};
use crate::sync::clock::ClockSnapshot;
use crate::sync::move_ledger::{common_prefix, LedgerDiff, MoveLedgerReplicator};
use crate::sync::ownership::{
    OwnershipAuthority, OwnershipGate, OwnershipRegistry, OwnershipTransition,
};
use crate::sync::replicated_var::ReplicatedVar;
use crate::sync::scheduler::TickScheduler;
use crate::sync::transport::{ChannelId, NetEvent, ObjectId, ParticipantId, PeerLink};

pub const BOARD_OBJECT: ObjectId = 1;

pub const BOARD_STATE_CHANNEL: ChannelId = 0;
pub const TURN_CHANNEL: ChannelId = 1;
pub const CLOCK_CHANNEL: ChannelId = 2;
pub const MOVES_CHANNEL: ChannelId = 3;

pub struct NetworkBoard<L: PeerLink> {
    link: L,
    session: ChessSession,
    registry: OwnershipRegistry,
    ledger: MoveLedgerReplicator,
    board_var: ReplicatedVar<BoardStateMessage>,
    turn_var: ReplicatedVar<Option<Color>>,
    clock_var: ReplicatedVar<ClockSnapshot>,
    ticks: TickScheduler,
    release_delay_s: f64,
    tick_delta_s: f64,
}

impl<L: PeerLink> NetworkBoard<L> {
    pub fn new(link: L, config: &SessionConfig) -> Self {
        Self::with_session(link, ChessSession::new(config), config)
    }

    pub fn with_session(link: L, session: ChessSession, config: &SessionConfig) -> Self {
        let tick_delta_s = config.tick_delta_s();
        let release_delay_s = config.ownership_release_delay_s;

        let mut registry = OwnershipRegistry::new();
        registry.register(
            OwnershipAuthority::new(BOARD_OBJECT, link.local_id(), release_delay_s, tick_delta_s)
                .with_server_id(link.server_id()),
        );

        Self {
            board_var: ReplicatedVar::new(
                BOARD_OBJECT,
                BOARD_STATE_CHANNEL,
                session.board_message(),
            ),
            turn_var: ReplicatedVar::new(BOARD_OBJECT, TURN_CHANNEL, session.current_turn()),
            clock_var: ReplicatedVar::new(BOARD_OBJECT, CLOCK_CHANNEL, session.clock_snapshot()),
            ledger: MoveLedgerReplicator::new(BOARD_OBJECT, MOVES_CHANNEL),
            ticks: TickScheduler::new(config.tick_rate_hz),
            link,
            session,
            registry,
            release_delay_s,
            tick_delta_s,
        }
    }

    #[inline]
    pub fn local_id(&self) -> ParticipantId {
        self.link.local_id()
    }

    #[inline]
    pub fn session(&self) -> &ChessSession {
        &self.session
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn board_authority(&self) -> Option<&OwnershipAuthority> {
        self.registry.get(BOARD_OBJECT)
    }

    /// Whether this participant holds, or is acquiring, the board token.
    pub fn holds_board(&self) -> bool {
        self.board_authority()
            .is_some_and(OwnershipAuthority::is_claimed_locally)
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.session.drain_events()
    }

    pub fn start_game(&mut self, mode: GameMode) -> Result<(), SessionError> {
        let gate = board_gate(&mut self.registry)?;
        self.session.start_game(gate, mode)
    }

    pub fn try_movement(&mut self, from: Square, to: Square) -> Result<Move, SessionError> {
        let gate = board_gate(&mut self.registry)?;
        self.session.try_movement(gate, from, to)
    }

    pub fn confirm_move(&mut self) -> Result<(), SessionError> {
        let gate = board_gate(&mut self.registry)?;
        self.session.confirm_move(gate)
    }

    pub fn undo_pending_move(&mut self) -> Result<Move, SessionError> {
        let gate = board_gate(&mut self.registry)?;
        self.session.undo_pending_move(gate)
    }

    pub fn reset_game(&mut self) -> Result<(), SessionError> {
        let gate = board_gate(&mut self.registry)?;
        self.session.reset_game(gate)
    }

    pub fn change_options(&mut self, options: OptionState) -> Result<(), SessionError> {
        let gate = board_gate(&mut self.registry)?;
        self.session.change_options(gate, options)
    }

    pub fn set_showing_options(&mut self, showing: bool) -> Result<(), SessionError> {
        self.claim_board()?;
        self.session.set_showing_options(showing);
        Ok(())
    }

    pub fn set_board_rotation(&mut self, rotation: f32) -> Result<(), SessionError> {
        self.claim_board()?;
        self.session.set_board_rotation(rotation);
        Ok(())
    }

    pub fn set_piece_location_highlighted(&mut self, square: Option<Square>) {
        self.session.set_piece_location_highlighted(square);
    }

    /// Keep the board token while the user is handling the board.
    pub fn set_interacting(&mut self, interacting: bool) {
        if let Some(board) = self.registry.get_mut(BOARD_OBJECT) {
            board.set_interacting(interacting);
        }
    }

    /// Make `object` (for example a grabbed piece) claimable on this board.
    pub fn register_object(&mut self, object: ObjectId) {
        self.registry.register(
            OwnershipAuthority::new(
                object,
                self.link.local_id(),
                self.release_delay_s,
                self.tick_delta_s,
            )
            .with_server_id(self.link.server_id()),
        );
    }

    /// Claim `object` on behalf of the board; released together with it.
    pub fn claim_by_board(&mut self, object: ObjectId) -> bool {
        self.registry.claim_by_proxy(BOARD_OBJECT, object)
    }

    pub fn object_authority(&self, object: ObjectId) -> Option<&OwnershipAuthority> {
        self.registry.get(object)
    }

    /// Leave the table. The board token and everything it holds by proxy go
    /// back to the authority, and the local game is dropped without being
    /// published as a reset.
    pub fn on_detach(&mut self) -> Result<(), SessionError> {
        if let Some(board) = self.registry.get_mut(BOARD_OBJECT) {
            board.set_interacting(false);
            board.set_hold_override(false);
        }
        self.registry.release(BOARD_OBJECT);
        if let Err(err) = self.send_ownership_commands() {
            debug!(%err, participant = self.link.local_id(), "release not delivered on detach");
        }
        info!(participant = self.link.local_id(), "board detached");
        self.session.leave_game()
    }

    /// Rejoin over a fresh link. Replication state starts over and is
    /// rebuilt from the join snapshot.
    pub fn on_attach(&mut self, link: L) {
        let objects: Vec<ObjectId> = self.registry.object_ids().collect();
        self.link = link;
        self.registry = OwnershipRegistry::new();
        for object in objects {
            self.register_object(object);
        }
        self.board_var = ReplicatedVar::new(
            BOARD_OBJECT,
            BOARD_STATE_CHANNEL,
            self.session.board_message(),
        );
        self.turn_var = ReplicatedVar::new(BOARD_OBJECT, TURN_CHANNEL, self.session.current_turn());
        self.clock_var =
            ReplicatedVar::new(BOARD_OBJECT, CLOCK_CHANNEL, self.session.clock_snapshot());
        self.ledger = MoveLedgerReplicator::new(BOARD_OBJECT, MOVES_CHANNEL);
        info!(participant = self.link.local_id(), "board attached");
    }

    /// One frame: fold in replicated events, run the session, then as many
    /// replication ticks as `dt` covers.
    pub fn update(&mut self, dt: f64) -> Result<(), SessionError> {
        self.pump_events()?;

        let gate = board_gate(&mut self.registry)?;
        self.session.update(gate, dt)?;

        for _ in 0..self.ticks.advance(dt) {
            self.replicate()?;
        }
        Ok(())
    }

    fn claim_board(&mut self) -> Result<(), SessionError> {
        let gate = board_gate(&mut self.registry)?;
        if OwnershipGate::claim(gate) {
            Ok(())
        } else {
            Err(SessionError::OwnershipUnavailable)
        }
    }

    fn pump_events(&mut self) -> Result<(), SessionError> {
        let mut board_lost = false;
        while let Some(event) = self.link.poll() {
            board_lost |= self.handle_event(&event)?;
        }
        if board_lost && !self.holds_board() {
            self.resync_after_loss()?;
        }
        Ok(())
    }

    /// Returns whether the event took the board token away.
    fn handle_event(&mut self, event: &NetEvent) -> Result<bool, SessionError> {
        let local_id = self.link.local_id();
        match event {
            NetEvent::OwnershipChanged { .. } => {
                if let Some((object, transition)) = self.registry.apply_event(event) {
                    debug!(object, ?transition, participant = local_id, "ownership transition");
                    if object == BOARD_OBJECT && transition == OwnershipTransition::Lost {
                        self.session.relinquish_authority();
                        return Ok(true);
                    }
                }
            }
            NetEvent::VarChanged { .. } => self.apply_var_event(local_id, event)?,
            _ => self.apply_ledger_event(local_id, event)?,
        }
        Ok(false)
    }

    fn apply_var_event(
        &mut self,
        local_id: ParticipantId,
        event: &NetEvent,
    ) -> Result<(), SessionError> {
        if let Some(message) = decoded(self.board_var.apply_event(local_id, event), "board state") {
            self.session.apply_board_message(message)?;
            self.ledger.set_mirror_epoch(message.game_epoch);
        } else if let Some(turn) = decoded(self.turn_var.apply_event(local_id, event), "turn") {
            self.session.end_turn_remote(turn)?;
        } else if let Some(clock) = decoded(self.clock_var.apply_event(local_id, event), "clock") {
            self.session.overwrite_clock(clock);
        }
        Ok(())
    }

    fn apply_ledger_event(
        &mut self,
        local_id: ParticipantId,
        event: &NetEvent,
    ) -> Result<(), SessionError> {
        let Some(diff) = self.ledger.apply_event(local_id, event) else {
            return Ok(());
        };
        match diff {
            LedgerDiff::Append { index, mv } => {
                self.session.apply_remote_append(index, mv)?;
            }
            LedgerDiff::RemoveAt { index, mv } => {
                self.session.apply_remote_remove(index, mv)?;
            }
            LedgerDiff::Full(moves) => {
                self.session.apply_remote_full(&moves)?;
                self.session.end_turn_remote(*self.turn_var.get())?;
            }
            LedgerDiff::Clear => self.session.apply_remote_clear()?,
        }
        Ok(())
    }

    /// Put the session back on the replicated board after the token moved
    /// away with local changes unpublished.
    fn resync_after_loss(&mut self) -> Result<(), SessionError> {
        self.session.apply_board_message(*self.board_var.get())?;

        let turn = *self.turn_var.get();
        if self.ledger.is_synced_with(self.session.ledger()) && self.session.current_turn() == turn
        {
            return Ok(());
        }

        let prefix = common_prefix(self.session.ledger(), self.ledger.mirror());
        info!(
            participant = self.link.local_id(),
            local = self.session.ledger().len(),
            replicated = self.ledger.mirror_len(),
            prefix,
            "rolling back to the replicated board"
        );
        self.session.rollback_to(prefix, turn)?;
        for (index, mv) in self.ledger.mirror_moves().into_iter().enumerate().skip(prefix) {
            if !self.session.apply_remote_append(index, mv)? {
                break;
            }
        }
        self.session.end_turn_remote(turn)?;
        self.session.overwrite_clock(*self.clock_var.get());
        Ok(())
    }

    fn replicate(&mut self) -> Result<(), SessionError> {
        // Claims must reach the authority before the writes they guard.
        self.send_ownership_commands()?;
        if self.holds_board() {
            self.push_state()?;
        }

        let hold = self.session.wants_authority() || (self.holds_board() && !self.is_published());
        if let Some(board) = self.registry.get_mut(BOARD_OBJECT) {
            board.set_hold_override(hold);
        }
        self.registry.on_tick();
        self.send_ownership_commands()
    }

    fn push_state(&mut self) -> Result<(), SessionError> {
        let board_changed = self.board_var.set(self.session.board_message());
        let ledger_pushed = self
            .ledger
            .push_diff(self.session.ledger(), self.session.game_epoch());
        let turn_changed = self.turn_var.set(self.session.current_turn());
        if board_changed || ledger_pushed || turn_changed {
            self.clock_var.set(self.session.clock_snapshot());
        }

        let mut commands = Vec::new();
        commands.extend(self.board_var.take_command()?);
        commands.extend(self.ledger.drain_commands());
        commands.extend(self.turn_var.take_command()?);
        commands.extend(self.clock_var.take_command()?);
        for command in commands {
            self.link.send(command)?;
        }
        Ok(())
    }

    fn is_published(&self) -> bool {
        self.ledger.is_synced_with(self.session.ledger())
            && *self.turn_var.get() == self.session.current_turn()
            && *self.board_var.get() == self.session.board_message()
    }

    fn send_ownership_commands(&mut self) -> Result<(), SessionError> {
        for command in self.registry.drain_commands() {
            self.link.send(command)?;
        }
        Ok(())
    }
}

fn board_gate(registry: &mut OwnershipRegistry) -> Result<&mut OwnershipAuthority, SessionError> {
    registry
        .get_mut(BOARD_OBJECT)
        .ok_or(SessionError::OwnershipUnavailable)
}

fn decoded<T>(result: Result<Option<T>, SyncError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            error!(%err, what, "replicated payload dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::opponent_driver::DriverMode;
    use crate::game_state::chess_types::PieceRecord;
    use crate::moves::move_descriptions::MoveKind;
    use crate::session::events::LossReason;
    use crate::sync::local_network::{LocalLink, LocalNetwork};
    use crate::sync::transport::SNAPSHOT_ORIGIN;

    const DT: f64 = 1.0 / 30.0;

    type Peer = NetworkBoard<LocalLink>;

    fn config() -> SessionConfig {
        SessionConfig {
            driver_mode: DriverMode::Inline,
            ai_think_time_s: 0.0,
            engine_seed: Some(11),
            ..SessionConfig::default()
        }
    }

    fn table_with(config: &SessionConfig, ids: &[ParticipantId]) -> (LocalNetwork, Vec<Peer>) {
        let network = LocalNetwork::new();
        let peers = ids
            .iter()
            .map(|id| NetworkBoard::new(network.connect(*id), config))
            .collect();
        (network, peers)
    }

    fn table(ids: &[ParticipantId]) -> (LocalNetwork, Vec<Peer>) {
        table_with(&config(), ids)
    }

    fn run(network: &LocalNetwork, peers: &mut [Peer], frames: usize) {
        for _ in 0..frames {
            for peer in peers.iter_mut() {
                peer.update(DT).expect("update should succeed");
            }
            network.flush();
        }
    }

    fn sq(text: &str) -> Square {
        Square::parse(text).expect("square should parse")
    }

    fn layout(peer: &Peer) -> Vec<(Square, PieceRecord)> {
        peer.session().occupancy().occupied_squares().collect()
    }

    fn started(ids: &[ParticipantId], mode: GameMode) -> (LocalNetwork, Vec<Peer>) {
        let (network, mut peers) = table(ids);
        peers[0].start_game(mode).expect("start should succeed");
        run(&network, &mut peers, 6);
        (network, peers)
    }

    #[test]
    fn observer_follows_the_owner_move() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        assert_eq!(peers[1].session().game_mode(), GameMode::HumanVsHuman);
        assert!(!network.is_claimed(BOARD_OBJECT), "idle board is released");

        let e4 = peers[0]
            .try_movement(sq("e2"), sq("e4"))
            .expect("move should not error");
        run(&network, &mut peers, 3);

        assert_eq!(peers[1].session().ledger(), &[e4]);
        assert_eq!(peers[1].session().current_turn(), Some(Color::Black));
        assert!(peers[1].session().pending_move().is_none());
        assert_eq!(layout(&peers[1]), layout(&peers[0]));
        assert!(peers[1].session().occupancy().check_invariants());
    }

    #[test]
    fn undo_before_confirm_is_replicated() {
        let mut config = config();
        config.default_options.press_confirm = true;
        let (network, mut peers) = table_with(&config, &[1, 2]);
        peers[0].start_game(GameMode::HumanVsHuman).expect("start should succeed");
        run(&network, &mut peers, 6);

        peers[0]
            .try_movement(sq("e2"), sq("e4"))
            .expect("move should not error");
        run(&network, &mut peers, 10);
        assert_eq!(network.owner_of(BOARD_OBJECT), 1, "pending move keeps the board");
        assert_eq!(peers[1].session().ledger().len(), 1);
        assert_eq!(peers[1].session().current_turn(), Some(Color::White));
        assert!(peers[1]
            .drain_events()
            .contains(&SessionEvent::UndoAvailable(Some(Color::White))));

        peers[0].undo_pending_move().expect("undo should succeed");
        run(&network, &mut peers, 6);
        for peer in &peers {
            assert!(peer.session().ledger().is_empty());
            assert!(peer.session().occupancy().piece_at(sq("e2")).is_some());
            assert_eq!(peer.session().current_turn(), Some(Color::White));
        }
        assert!(!network.is_claimed(BOARD_OBJECT));
    }

    #[test]
    fn simultaneous_moves_leave_one_holder_and_one_history() {
        let (network, mut peers) = started(&[1, 2, 3], GameMode::HumanVsHuman);

        for (peer, (from, to)) in peers
            .iter_mut()
            .zip([("e2", "e4"), ("d2", "d4"), ("c2", "c4")])
        {
            let mv = peer.try_movement(sq(from), sq(to)).expect("move should not error");
            assert!(!mv.is_invalid());
        }
        run(&network, &mut peers, 1);
        for peer in peers.iter_mut() {
            peer.update(DT).expect("update should succeed");
        }

        let holders: Vec<_> = peers
            .iter()
            .filter(|p| p.holds_board())
            .map(Peer::local_id)
            .collect();
        assert_eq!(holders, vec![3]);

        network.flush();
        run(&network, &mut peers, 6);
        // The authority kept the first write it accepted.
        let winner = peers[0].session().ledger().to_vec();
        assert_eq!(winner.len(), 1);
        assert_eq!(winner[0].to_long_algebraic(), "e2e4");
        for peer in &peers {
            assert_eq!(peer.session().ledger(), winner.as_slice(), "peer {}", peer.local_id());
            assert_eq!(peer.session().current_turn(), Some(Color::Black));
            assert_eq!(layout(peer), layout(&peers[0]));
        }
    }

    #[test]
    fn move_made_during_a_release_is_rolled_back() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        peers[0].set_interacting(true);
        run(&network, &mut peers, 6);
        assert_eq!(network.owner_of(BOARD_OBJECT), 1);

        peers[0].set_interacting(false);
        for _ in 0..10 {
            peers[0].update(DT).expect("update should succeed");
            if network.pending_commands() > 0 {
                break;
            }
        }
        network.flush();
        assert!(!network.is_claimed(BOARD_OBJECT), "release reached the authority");

        // The local gate has not seen the release yet.
        let e4 = peers[0]
            .try_movement(sq("e2"), sq("e4"))
            .expect("move should not error");
        assert!(!e4.is_invalid());
        assert_eq!(peers[0].session().current_turn(), Some(Color::Black));

        peers[0].update(DT).expect("update should succeed");
        assert!(!peers[0].holds_board());
        assert!(peers[0].session().ledger().is_empty());
        assert_eq!(peers[0].session().current_turn(), Some(Color::White));
        assert!(peers[0].session().occupancy().piece_at(sq("e2")).is_some());

        run(&network, &mut peers, 4);
        for peer in &peers {
            assert!(peer.session().ledger().is_empty(), "peer {}", peer.local_id());
        }
        assert_eq!(layout(&peers[0]), layout(&peers[1]));
        assert!(!network.is_claimed(BOARD_OBJECT));
    }

    #[test]
    fn timeout_is_reported_once_per_participant() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        peers[0].drain_events();
        peers[1].drain_events();
        for peer in peers.iter_mut() {
            peer.session.overwrite_clock(ClockSnapshot {
                white: 1.0,
                black: 300.0,
            });
        }

        for peer in peers.iter_mut() {
            peer.update(1.5).expect("update should succeed");
        }
        network.flush();
        run(&network, &mut peers, 10);

        for peer in peers.iter_mut() {
            let losses: Vec<_> = peer
                .drain_events()
                .into_iter()
                .filter(|e| matches!(e, SessionEvent::PlayerLost { .. }))
                .collect();
            assert_eq!(
                losses,
                vec![SessionEvent::PlayerLost {
                    color: Color::White,
                    reason: LossReason::Timeout,
                }]
            );
        }
    }

    #[test]
    fn late_joiner_catches_up_mid_game() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        for (from, to) in [("e2", "e4"), ("e7", "e5"), ("g1", "f3")] {
            peers[0]
                .try_movement(sq(from), sq(to))
                .expect("move should not error");
            run(&network, &mut peers, 2);
        }
        run(&network, &mut peers, 6);

        peers.push(NetworkBoard::new(network.connect(3), &config()));
        run(&network, &mut peers, 2);

        let joiner = &peers[2];
        assert_eq!(joiner.session().game_mode(), GameMode::HumanVsHuman);
        assert_eq!(joiner.session().ledger(), peers[0].session().ledger());
        assert_eq!(joiner.session().current_turn(), Some(Color::Black));
        assert!(joiner.session().pending_move().is_none());
        assert_eq!(layout(joiner), layout(&peers[0]));
        assert!(joiner.session().move_timer(Color::White) < 2400.0);
    }

    #[test]
    fn time_amount_change_reaches_observers() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        run(&network, &mut peers, 30);
        assert!(peers[1].session().move_timer(Color::White) > 2000.0);

        let options = OptionState {
            time_amount_index: 0,
            ..peers[0].session().options()
        };
        peers[0].change_options(options).expect("options should change");
        run(&network, &mut peers, 4);

        assert_eq!(peers[1].session().options().time_amount_index, 0);
        for peer in &peers {
            let white = peer.session().move_timer(Color::White);
            assert!(white <= 300.0 && white > 290.0, "white clock {white}");
            assert_eq!(peer.session().move_timer(Color::Black), 300.0);
        }
    }

    #[test]
    fn detach_releases_the_board_and_attach_catches_up() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        peers[0]
            .try_movement(sq("e2"), sq("e4"))
            .expect("move should not error");
        run(&network, &mut peers, 6);
        peers[0].set_interacting(true);
        run(&network, &mut peers, 6);
        assert!(network.is_claimed(BOARD_OBJECT));
        assert_eq!(network.owner_of(BOARD_OBJECT), 1);

        peers[0].on_detach().expect("detach should succeed");
        network.flush();
        assert!(!network.is_claimed(BOARD_OBJECT));
        assert_eq!(peers[0].session().game_mode(), GameMode::NotStarted);
        assert!(peers[0].session().ledger().is_empty());
        assert!(peers[0]
            .drain_events()
            .contains(&SessionEvent::GameModeChanged(GameMode::NotStarted)));

        network.disconnect(1);
        run(&network, &mut peers[1..], 3);
        assert_eq!(peers[1].session().game_mode(), GameMode::HumanVsHuman);
        let e5 = peers[1]
            .try_movement(sq("e7"), sq("e5"))
            .expect("move should not error");
        assert!(!e5.is_invalid());
        run(&network, &mut peers[1..], 6);
        assert_eq!(peers[1].session().ledger().len(), 2);

        peers[0].on_attach(network.connect(1));
        run(&network, &mut peers, 3);
        assert_eq!(peers[0].session().game_mode(), GameMode::HumanVsHuman);
        assert_eq!(peers[0].session().ledger(), peers[1].session().ledger());
        assert_eq!(peers[0].session().current_turn(), Some(Color::White));
        assert_eq!(layout(&peers[0]), layout(&peers[1]));
        assert!(!peers[0].holds_board());
    }

    #[test]
    fn restart_in_the_same_mode_is_followed() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        peers[0]
            .try_movement(sq("e2"), sq("e4"))
            .expect("move should not error");
        run(&network, &mut peers, 6);
        assert_eq!(peers[1].session().ledger().len(), 1);

        peers[0].start_game(GameMode::HumanVsHuman).expect("restart should succeed");
        run(&network, &mut peers, 6);
        assert_eq!(peers[1].session().game_epoch(), 2);
        assert!(peers[1].session().ledger().is_empty());
        assert_eq!(layout(&peers[1]), layout(&peers[0]));

        peers[1].reset_game().expect("reset should succeed");
        run(&network, &mut peers, 6);
        assert_eq!(peers[0].session().game_mode(), GameMode::NotStarted);
        assert_eq!(peers[0].session().game_epoch(), 3);
    }

    #[test]
    fn computer_reply_is_replicated_by_its_requester_only() {
        let (network, mut peers) = started(&[1, 2], GameMode::HumanVsAI);
        peers[0]
            .try_movement(sq("e2"), sq("e4"))
            .expect("move should not error");
        run(&network, &mut peers, 30);

        for peer in &peers {
            assert_eq!(peer.session().ledger().len(), 2, "peer {}", peer.local_id());
            assert_eq!(peer.session().current_turn(), Some(Color::White));
        }
        assert_eq!(peers[1].session().ledger(), peers[0].session().ledger());
        assert!(!network.is_claimed(BOARD_OBJECT));
    }

    #[test]
    fn ordering_violations_and_desyncs_are_dropped() {
        let (_network, mut peers) = started(&[1, 2], GameMode::HumanVsHuman);
        let observer = &mut peers[1];
        observer.drain_events();

        let e4 = Move::new(12, 28, MoveKind::PawnDoubleStep);
        let gap = NetEvent::ListAdd {
            object: BOARD_OBJECT,
            channel: MOVES_CHANNEL,
            origin: 1,
            index: 4,
            value: e4.wire(),
        };
        observer.handle_event(&gap).expect("event should be handled");
        assert!(observer.session().ledger().is_empty());
        // No resynchronization: the mirror kept the entry the session refused.
        assert_eq!(observer.ledger.mirror_len(), 1);

        let bogus = NetEvent::ListFull {
            object: BOARD_OBJECT,
            channel: MOVES_CHANNEL,
            values: vec![Move::new(12, 44, MoveKind::Standard).wire()],
        };
        observer.handle_event(&bogus).expect("event should be handled");
        assert!(observer.session().ledger().is_empty());
        assert!(!observer
            .drain_events()
            .iter()
            .any(|e| matches!(e, SessionEvent::PieceMoved { .. })));

        let corrupt = NetEvent::VarChanged {
            object: BOARD_OBJECT,
            channel: TURN_CHANNEL,
            origin: SNAPSHOT_ORIGIN,
            payload: b"not json".to_vec(),
        };
        observer.handle_event(&corrupt).expect("bad payloads are dropped");
        assert_eq!(observer.session().current_turn(), Some(Color::White));
    }

    #[test]
    fn board_release_cascades_to_proxied_pieces() {
        let (network, mut peers) = table(&[1, 2]);
        for peer in peers.iter_mut() {
            peer.register_object(10);
            peer.register_object(11);
        }
        peers[0].start_game(GameMode::HumanVsHuman).expect("start should succeed");
        assert!(peers[0].claim_by_board(10));
        assert!(peers[0].claim_by_board(11));
        assert!(!peers[0].claim_by_board(10), "already claimed");

        run(&network, &mut peers, 1);
        assert_eq!(network.owner_of(10), 1);
        assert!(network.is_claimed(11));

        run(&network, &mut peers, 8);
        for object in [BOARD_OBJECT, 10, 11] {
            assert!(!network.is_claimed(object), "object {object} still claimed");
        }
        let piece = peers[0].object_authority(10).expect("registered");
        assert!(!piece.is_claimed_by_proxy());
    }
}
