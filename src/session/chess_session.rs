//! Turn and session state machine for one participant.
//!
//! The session owns the local board model: the rules oracle, the physical
//! piece occupancy, the move ledger and the clock. Local operations mutate it
//! under an ownership gate; remote operations replay what the board owner
//! replicated. Timed work (the computer settle pause) goes through a deferred
//! queue driven by `update`.

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::engines::engine_trait::build_engine;
use crate::engines::opponent_driver::{OpponentDriver, OpponentReply};
use crate::errors::SessionError;
use crate::game_state::chess_types::{Color, Square};
use crate::moves::move_descriptions::Move;
use crate::oracle::rules_oracle::{GameOutcome, RulesOracle, StandardRules};
use crate::session::board_occupancy::BoardOccupancy;
use crate::session::events::{LossReason, SessionEvent};
use crate::session::options::{
    BoardStateMessage, GameMode, OptionState, PlayerKind, TIME_AMOUNTS_S,
};
use crate::sync::clock::{ClockSnapshot, ClockSynchronizer};
use crate::sync::ownership::OwnershipGate;
use crate::sync::scheduler::DeferredQueue;
use crate::utils::pgn::{result_for_loser, write_pgn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeferredAction {
    /// End the turn of a computer move applied under `epoch`.
    SettleComputerMove { epoch: u32 },
}

pub struct ChessSession {
    oracle: Box<dyn RulesOracle>,
    occupancy: BoardOccupancy,
    ledger: Vec<Move>,
    clock: ClockSynchronizer,
    driver: OpponentDriver,
    deferred: DeferredQueue<DeferredAction>,
    events: Vec<SessionEvent>,

    mode: GameMode,
    options: OptionState,
    showing_options: bool,
    board_rotation: f32,
    game_epoch: u32,
    outcome: GameOutcome,

    current_turn: Option<Color>,
    pending_move: Option<Move>,
    pending_is_local: bool,
    settling: Option<Move>,
    player_lost: Option<Color>,
    last_move_local: bool,
    highlighted: Option<Square>,

    now_s: f64,
    ai_settle_delay_s: f64,
}

impl ChessSession {
    pub fn new(config: &SessionConfig) -> Self {
        let driver = OpponentDriver::new(
            build_engine(config.engine, config.engine_seed),
            config.driver_mode,
            config.ai_think_time_s,
        );
        Self::with_parts(Box::new(StandardRules::new()), driver, config)
    }

    /// Build around an injected oracle and opponent driver.
    pub fn with_parts(
        oracle: Box<dyn RulesOracle>,
        driver: OpponentDriver,
        config: &SessionConfig,
    ) -> Self {
        let options = config.default_options;
        Self {
            oracle,
            occupancy: BoardOccupancy::new(config.reserve_queens),
            ledger: Vec::new(),
            clock: ClockSynchronizer::new(options.time_amount_s()),
            driver,
            deferred: DeferredQueue::new(),
            events: Vec::new(),
            mode: GameMode::NotStarted,
            options,
            showing_options: false,
            board_rotation: 0.0,
            game_epoch: 0,
            outcome: GameOutcome::Playing,
            current_turn: None,
            pending_move: None,
            pending_is_local: false,
            settling: None,
            player_lost: None,
            last_move_local: false,
            highlighted: None,
            now_s: 0.0,
            ai_settle_delay_s: config.ai_settle_delay_s,
        }
    }

    #[inline]
    pub fn current_turn(&self) -> Option<Color> {
        self.current_turn
    }

    #[inline]
    pub fn game_mode(&self) -> GameMode {
        self.mode
    }

    #[inline]
    pub fn options(&self) -> OptionState {
        self.options
    }

    #[inline]
    pub fn showing_options(&self) -> bool {
        self.showing_options
    }

    #[inline]
    pub fn board_rotation(&self) -> f32 {
        self.board_rotation
    }

    #[inline]
    pub fn game_epoch(&self) -> u32 {
        self.game_epoch
    }

    /// Seconds left on `color`'s clock.
    #[inline]
    pub fn move_timer(&self, color: Color) -> f64 {
        self.clock.remaining(color)
    }

    #[inline]
    pub fn clock_snapshot(&self) -> ClockSnapshot {
        self.clock.snapshot()
    }

    #[inline]
    pub fn ledger(&self) -> &[Move] {
        &self.ledger
    }

    #[inline]
    pub fn pending_move(&self) -> Option<Move> {
        self.pending_move
    }

    #[inline]
    pub fn player_lost(&self) -> Option<Color> {
        self.player_lost
    }

    #[inline]
    pub fn outcome(&self) -> GameOutcome {
        self.outcome
    }

    #[inline]
    pub fn occupancy(&self) -> &BoardOccupancy {
        &self.occupancy
    }

    pub fn oracle(&self) -> &dyn RulesOracle {
        self.oracle.as_ref()
    }

    pub fn engine_name(&self) -> &str {
        self.driver.engine_name()
    }

    #[inline]
    pub fn now(&self) -> f64 {
        self.now_s
    }

    #[inline]
    pub fn is_game_over(&self) -> bool {
        self.player_lost.is_some()
    }

    /// No pending move and no computer move settling.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.pending_move.is_none() && self.settling.is_none()
    }

    /// A local move is in flight and the board token must not be released.
    pub fn wants_authority(&self) -> bool {
        (self.pending_move.is_some() && self.pending_is_local) || self.settling.is_some()
    }

    /// The published turn already belongs to the side the oracle says moves.
    pub fn is_move_confirmed(&self) -> bool {
        self.current_turn == Some(self.oracle.side_to_move())
    }

    fn should_show_undo(&self) -> bool {
        !self.is_move_confirmed() && !self.ledger.is_empty()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn new_game(
        &mut self,
        gate: &mut dyn OwnershipGate,
        white: PlayerKind,
        black: PlayerKind,
    ) -> Result<(), SessionError> {
        self.start_game(gate, GameMode::from_players(white, black))
    }

    pub fn start_game(
        &mut self,
        gate: &mut dyn OwnershipGate,
        mode: GameMode,
    ) -> Result<(), SessionError> {
        if mode == GameMode::NotStarted {
            return self.reset_game(gate);
        }
        if !gate.claim() {
            return Err(SessionError::OwnershipUnavailable);
        }
        self.game_epoch = self.game_epoch.wrapping_add(1);
        self.begin_game(mode, true)
    }

    /// Propose moving the piece on `from` to `to`.
    ///
    /// Illegal proposals return `Move::INVALID` and change nothing.
    pub fn try_movement(
        &mut self,
        gate: &mut dyn OwnershipGate,
        from: Square,
        to: Square,
    ) -> Result<Move, SessionError> {
        if self.mode == GameMode::NotStarted {
            return Err(SessionError::NotStarted);
        }
        if self.is_game_over() {
            return Err(SessionError::GameOver);
        }
        if !self.is_idle() {
            return Err(SessionError::NotIdle);
        }
        let side = self.oracle.side_to_move();
        if self.mode.is_computer(side) {
            return Err(SessionError::ComputerTurn(side));
        }

        let (Some(from_index), Some(to_index)) = (from.to_index(), to.to_index()) else {
            debug!(%from, %to, "off-board proposal rejected");
            return Ok(Move::INVALID);
        };
        let mv = self.oracle.find_legal_move(from_index, to_index)?;
        if mv.is_invalid() {
            debug!(%from, %to, "illegal proposal rejected");
            return Ok(Move::INVALID);
        }
        if !gate.claim() {
            warn!(%mv, "board is held by another participant");
            return Err(SessionError::OwnershipUnavailable);
        }

        self.apply_to_board(mv)?;
        self.pending_move = Some(mv);
        self.pending_is_local = true;
        self.highlighted = None;
        self.events.push(SessionEvent::UndoAvailable(self.current_turn));
        debug!(%mv, %side, "move played");

        if !self.options.press_confirm {
            self.confirm_move(gate)?;
        }
        Ok(mv)
    }

    pub fn confirm_move(&mut self, gate: &mut dyn OwnershipGate) -> Result<(), SessionError> {
        if self.pending_move.is_none() {
            return Err(SessionError::NoPendingMove);
        }
        if !gate.holds() && !gate.claim() {
            return Err(SessionError::OwnershipUnavailable);
        }
        self.end_turn_local()
    }

    /// Take back the unconfirmed move at the ledger tail.
    pub fn undo_pending_move(&mut self, gate: &mut dyn OwnershipGate) -> Result<Move, SessionError> {
        let Some(mv) = self.pending_move else {
            return Err(SessionError::NoPendingMove);
        };
        if !gate.claim() {
            return Err(SessionError::OwnershipUnavailable);
        }
        self.unapply_last()?;
        self.pending_move = None;
        self.pending_is_local = false;
        self.highlighted = None;
        self.events.push(SessionEvent::UndoAvailable(None));
        debug!(%mv, "pending move undone");
        Ok(mv)
    }

    pub fn reset_game(&mut self, gate: &mut dyn OwnershipGate) -> Result<(), SessionError> {
        if !gate.claim() {
            return Err(SessionError::OwnershipUnavailable);
        }
        self.game_epoch = self.game_epoch.wrapping_add(1);
        self.events.push(SessionEvent::UndoAvailable(None));
        self.stop_game()
    }

    /// Replace the options of a running game.
    pub fn change_options(
        &mut self,
        gate: &mut dyn OwnershipGate,
        options: OptionState,
    ) -> Result<(), SessionError> {
        if self.mode == GameMode::NotStarted {
            return Err(SessionError::NotStarted);
        }
        if !gate.claim() {
            return Err(SessionError::OwnershipUnavailable);
        }
        self.update_options(options);
        Ok(())
    }

    /// Whole-value option replace; ignored while no game runs. A new time
    /// amount restarts both clocks, an unknown one keeps the current amount.
    pub fn update_options(&mut self, mut options: OptionState) -> bool {
        if self.mode == GameMode::NotStarted {
            debug!("options ignored while no game runs");
            return false;
        }
        if usize::from(options.time_amount_index) >= TIME_AMOUNTS_S.len() {
            warn!(
                index = options.time_amount_index,
                kept = self.options.time_amount_index,
                "unknown time amount index ignored"
            );
            options.time_amount_index = self.options.time_amount_index;
        }
        if options == self.options {
            return false;
        }
        if options.time_amount_index != self.options.time_amount_index {
            info!(seconds = options.time_amount_s(), "time amount changed, clocks reset");
            self.clock.reset(options.time_amount_s());
        }
        self.options = options;
        true
    }

    pub fn set_showing_options(&mut self, showing: bool) {
        self.showing_options = showing;
    }

    pub fn set_board_rotation(&mut self, rotation: f32) {
        self.board_rotation = rotation;
    }

    pub fn overwrite_clock(&mut self, snapshot: ClockSnapshot) {
        self.clock.overwrite(snapshot);
    }

    /// The board-wide state as the owner replicates it.
    pub fn board_message(&self) -> BoardStateMessage {
        BoardStateMessage {
            game_mode: self.mode,
            showing_options: self.showing_options,
            slide_board: self.options.slide_board,
            time_control: self.options.time_control,
            time_amount_index: self.options.time_amount_index,
            board_rotation: self.board_rotation,
            game_epoch: self.game_epoch,
        }
    }

    pub fn apply_board_message(&mut self, message: BoardStateMessage) -> Result<(), SessionError> {
        self.set_game_started_remote(message.game_mode, message.game_epoch)?;
        self.update_options(message.merge_into(self.options));
        self.showing_options = message.showing_options;
        self.board_rotation = message.board_rotation;
        Ok(())
    }

    /// Follow a game start or reset published by the owner.
    pub fn set_game_started_remote(
        &mut self,
        mode: GameMode,
        epoch: u32,
    ) -> Result<(), SessionError> {
        if mode == self.mode && epoch == self.game_epoch {
            return Ok(());
        }
        self.game_epoch = epoch;
        match mode {
            GameMode::NotStarted => self.stop_game(),
            _ => self.begin_game(mode, false),
        }
    }

    /// Replay a move the owner appended at `index`. Returns whether it was
    /// applied; out-of-order and unmatched moves are logged and dropped.
    pub fn apply_remote_append(&mut self, index: usize, wire: Move) -> Result<bool, SessionError> {
        if index != self.ledger.len() {
            error!(index, len = self.ledger.len(), "ledger ordering violation, append dropped");
            return Ok(false);
        }
        let mv = self.oracle.match_wire_move(wire)?;
        if mv.is_invalid() {
            error!(index, %wire, fen = %self.oracle.fen(), "ledger desynchronized, append dropped");
            return Ok(false);
        }

        if self.driver.is_searching() {
            self.driver.abandon();
        }
        self.apply_to_board(mv)?;
        self.pending_move = Some(mv);
        self.pending_is_local = false;
        self.highlighted = None;
        let undo_for = if self.should_show_undo() {
            self.current_turn
        } else {
            None
        };
        self.events.push(SessionEvent::UndoAvailable(undo_for));
        debug!(index, %mv, "remote move applied");
        Ok(true)
    }

    /// Take back the ledger tail the owner removed.
    pub fn apply_remote_remove(&mut self, index: usize, wire: Move) -> Result<bool, SessionError> {
        let Some(tail) = self.ledger.last().copied() else {
            error!(index, "ledger ordering violation, removal from an empty ledger dropped");
            return Ok(false);
        };
        if index + 1 != self.ledger.len() {
            error!(index, len = self.ledger.len(), "ledger ordering violation, removal dropped");
            return Ok(false);
        }
        if !tail.same_squares(wire) {
            error!(index, %tail, %wire, "ledger desynchronized, removal dropped");
            return Ok(false);
        }

        self.unapply_last()?;
        self.pending_move = None;
        self.pending_is_local = false;
        self.events.push(SessionEvent::UndoAvailable(None));
        debug!(index, %tail, "remote move removed");
        Ok(true)
    }

    /// Bring the ledger to a full replicated list: unwind what differs, then
    /// append the rest in order.
    pub fn apply_remote_full(&mut self, moves: &[Move]) -> Result<(), SessionError> {
        let common = self
            .ledger
            .iter()
            .zip(moves)
            .take_while(|(local, remote)| local.wire() == remote.wire())
            .count();
        while self.ledger.len() > common {
            self.unapply_last()?;
        }
        for (index, mv) in moves.iter().enumerate().skip(common) {
            if !self.apply_remote_append(index, *mv)? {
                break;
            }
        }
        Ok(())
    }

    pub fn apply_remote_clear(&mut self) -> Result<(), SessionError> {
        self.unwind_ledger()?;
        self.pending_move = None;
        self.pending_is_local = false;
        self.events.push(SessionEvent::UndoAvailable(None));
        Ok(())
    }

    /// Adopt the turn the owner published.
    pub fn end_turn_remote(&mut self, turn: Option<Color>) -> Result<(), SessionError> {
        let changed = self.current_turn != turn;
        self.current_turn = turn;
        self.highlighted = None;

        let show_undo = self.should_show_undo();
        self.events
            .push(SessionEvent::UndoAvailable(if show_undo { turn } else { None }));
        // An unconfirmed remote move stays pending until its mover decides.
        self.pending_move = if show_undo {
            self.ledger.last().copied()
        } else {
            None
        };
        self.pending_is_local = false;
        self.last_move_local = false;

        if changed {
            self.events.push(SessionEvent::TurnChanged(turn));
        }
        if self.mode != GameMode::NotStarted && self.is_move_confirmed() {
            self.check_player_lose()?;
        }
        Ok(())
    }

    /// Drop the local game when this participant leaves the table. The epoch
    /// is kept so a rejoin follows whatever the owner published meanwhile.
    pub fn leave_game(&mut self) -> Result<(), SessionError> {
        if self.mode == GameMode::NotStarted && self.ledger.is_empty() {
            return Ok(());
        }
        self.relinquish_authority();
        self.stop_game()
    }

    /// The token went elsewhere: local intent no longer holds it.
    pub fn relinquish_authority(&mut self) {
        if self.wants_authority() {
            warn!("board token lost with a local move in flight");
        }
        self.pending_is_local = false;
        self.settling = None;
        self.deferred.clear();
        self.last_move_local = false;
        if self.driver.is_searching() {
            self.driver.abandon();
        }
    }

    /// Unwind the speculative tail down to `len` moves and restore `turn`.
    pub fn rollback_to(&mut self, len: usize, turn: Option<Color>) -> Result<(), SessionError> {
        let from_len = self.ledger.len();
        while self.ledger.len() > len {
            self.unapply_last()?;
        }
        self.pending_move = None;
        self.pending_is_local = false;
        self.settling = None;
        self.deferred.clear();
        self.highlighted = None;
        if self.driver.is_searching() {
            self.driver.abandon();
        }
        if self.current_turn != turn {
            self.current_turn = turn;
            self.events.push(SessionEvent::TurnChanged(turn));
        }
        self.events.push(SessionEvent::UndoAvailable(None));
        warn!(from_len, to_len = self.ledger.len(), "speculative moves rolled back");
        Ok(())
    }

    /// Distinct target squares of the legal moves starting on `from`.
    pub fn legal_target_squares(&self, from: Square) -> Result<Vec<Square>, SessionError> {
        let Some(index) = from.to_index() else {
            return Ok(Vec::new());
        };
        let mut targets: Vec<Square> = self
            .oracle
            .legal_moves()?
            .into_iter()
            .filter(|mv| mv.from() == index)
            .map(Move::target_square)
            .collect();
        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    pub fn set_piece_location_highlighted(&mut self, square: Option<Square>) {
        self.highlighted = square;
    }

    #[inline]
    pub fn highlighted_piece(&self) -> Option<Square> {
        self.highlighted
    }

    pub fn highlighted_squares(&self) -> Result<Vec<Square>, SessionError> {
        match self.highlighted {
            Some(square) if self.options.show_legal_moves && self.mode != GameMode::NotStarted => {
                self.legal_target_squares(square)
            }
            _ => Ok(Vec::new()),
        }
    }

    pub fn export_pgn(&self, date: NaiveDate) -> Result<String, SessionError> {
        let mut start = self.oracle.shadow_copy();
        start.load_start_position();
        Ok(write_pgn(
            start.as_ref(),
            &self.ledger,
            result_for_loser(self.player_lost),
            date,
        )?)
    }

    /// Frame update: clock countdown, due deferred actions, computer replies.
    pub fn update(&mut self, gate: &mut dyn OwnershipGate, dt: f64) -> Result<(), SessionError> {
        let dt = dt.max(0.0);
        self.now_s += dt;

        if self.mode != GameMode::NotStarted {
            let expired = self.clock.tick(
                dt,
                self.current_turn,
                self.options.time_control,
                self.player_lost,
            );
            if let Some(color) = expired {
                self.record_loss(color, LossReason::Timeout);
            }
        }

        for action in self.deferred.pop_due(self.now_s) {
            self.run_deferred(gate, action)?;
        }

        if let Some(reply) = self.driver.poll(self.now_s) {
            self.handle_opponent_reply(gate, reply)?;
        }
        Ok(())
    }

    fn begin_game(&mut self, mode: GameMode, from_local: bool) -> Result<(), SessionError> {
        self.unwind_ledger()?;
        self.oracle.load_start_position();
        self.driver.new_game();
        self.reset_board_state();
        self.mode = mode;
        info!(
            ?mode,
            epoch = self.game_epoch,
            from_local,
            engine = self.driver.engine_name(),
            "game started"
        );

        self.events.push(SessionEvent::GameModeChanged(mode));
        self.events.push(SessionEvent::TurnChanged(self.current_turn));
        self.events.push(SessionEvent::UndoAvailable(None));

        self.last_move_local = from_local;
        self.notify_next_player();
        Ok(())
    }

    fn reset_board_state(&mut self) {
        let destroyed = self.occupancy.reset();
        if destroyed > 0 {
            debug!(destroyed, "spawned pieces destroyed");
        }
        self.ledger.clear();
        self.clock.reset(self.options.time_amount_s());
        self.current_turn = Some(self.oracle.side_to_move());
        self.player_lost = None;
        self.outcome = GameOutcome::Playing;
        self.pending_move = None;
        self.pending_is_local = false;
        self.settling = None;
        self.deferred.clear();
        self.highlighted = None;
    }

    fn stop_game(&mut self) -> Result<(), SessionError> {
        self.unwind_ledger()?;
        self.oracle.load_start_position();
        let destroyed = self.occupancy.reset();
        self.driver.abandon();
        self.deferred.clear();
        self.pending_move = None;
        self.pending_is_local = false;
        self.settling = None;
        self.highlighted = None;
        self.player_lost = None;
        self.outcome = GameOutcome::Playing;
        self.mode = GameMode::NotStarted;
        info!(destroyed, epoch = self.game_epoch, "game reset");

        self.events
            .push(SessionEvent::GameModeChanged(GameMode::NotStarted));
        if self.current_turn.take().is_some() {
            self.events.push(SessionEvent::TurnChanged(None));
        }
        Ok(())
    }

    fn end_turn_local(&mut self) -> Result<(), SessionError> {
        let turn = Some(self.oracle.side_to_move());
        self.highlighted = None;
        self.events.push(SessionEvent::UndoAvailable(None));
        self.pending_move = None;
        self.pending_is_local = false;
        self.last_move_local = true;
        self.current_turn = turn;
        self.events.push(SessionEvent::TurnChanged(turn));

        self.check_player_lose()?;
        self.notify_next_player();
        Ok(())
    }

    /// Classify the position for the side to move and record any loss.
    fn check_player_lose(&mut self) -> Result<(), SessionError> {
        let outcome = self.oracle.outcome()?;
        if outcome != self.outcome {
            info!(%outcome, plies = self.ledger.len(), "outcome changed");
        }
        self.outcome = outcome;

        let Some(reason) = LossReason::from_outcome(outcome) else {
            return Ok(());
        };
        let loser = match outcome {
            GameOutcome::WhiteIsMated => Color::White,
            GameOutcome::BlackIsMated => Color::Black,
            _ => draw_loser(
                self.occupancy.pieces_on_board(Color::White),
                self.occupancy.pieces_on_board(Color::Black),
            ),
        };
        self.record_loss(loser, reason);
        Ok(())
    }

    fn record_loss(&mut self, color: Color, reason: LossReason) {
        if self.player_lost.is_some() {
            return;
        }
        self.player_lost = Some(color);
        if self.driver.is_searching() {
            self.driver.abandon();
        }
        info!(%color, %reason, "player lost");
        self.events.push(SessionEvent::PlayerLost { color, reason });
    }

    /// Start a computer search when the side to move is a computer and this
    /// participant played the last move.
    fn notify_next_player(&mut self) {
        if !self.last_move_local || self.mode == GameMode::NotStarted || self.is_game_over() {
            return;
        }
        let side = self.oracle.side_to_move();
        if !self.mode.is_computer(side) {
            return;
        }
        if let Err(err) = self
            .driver
            .request_move(self.oracle.as_ref(), side, self.now_s)
        {
            warn!(%err, %side, "computer search could not start");
        }
    }

    fn handle_opponent_reply(
        &mut self,
        gate: &mut dyn OwnershipGate,
        reply: OpponentReply,
    ) -> Result<(), SessionError> {
        let OpponentReply { color, result } = reply;
        let mv = match result {
            Ok(mv) => mv,
            Err(err) => {
                warn!(%err, %color, "computer search failed");
                return Ok(());
            }
        };

        let still_wanted = self.mode.is_computer(color)
            && !self.is_game_over()
            && self.is_idle()
            && color == self.oracle.side_to_move();
        if !still_wanted {
            debug!(%mv, %color, "stale computer move dropped");
            return Ok(());
        }

        let legal = self.oracle.match_wire_move(mv)?;
        if legal.is_invalid() {
            warn!(%mv, %color, "computer proposed an illegal move");
            self.notify_next_player();
            return Ok(());
        }
        if !gate.claim() {
            warn!(%color, "board held elsewhere, computer search requested again");
            self.notify_next_player();
            return Ok(());
        }

        self.apply_to_board(legal)?;
        self.settling = Some(legal);
        self.deferred.schedule(
            self.now_s + self.ai_settle_delay_s,
            DeferredAction::SettleComputerMove {
                epoch: self.game_epoch,
            },
        );
        debug!(%legal, %color, "computer move applied");
        Ok(())
    }

    fn run_deferred(
        &mut self,
        gate: &mut dyn OwnershipGate,
        action: DeferredAction,
    ) -> Result<(), SessionError> {
        match action {
            DeferredAction::SettleComputerMove { epoch } => {
                if epoch != self.game_epoch || self.settling.is_none() {
                    debug!(epoch, "stale settle dropped");
                    return Ok(());
                }
                self.settling = None;
                if !gate.claim() {
                    warn!("board lost while a computer move settled");
                    return Ok(());
                }
                self.end_turn_local()
            }
        }
    }

    fn apply_to_board(&mut self, mv: Move) -> Result<(), SessionError> {
        let changes = self.oracle.apply_move(mv)?;
        self.ledger.push(mv);
        let events = self.occupancy.apply_changes(&changes);
        self.events.extend(events);
        Ok(())
    }

    fn unapply_last(&mut self) -> Result<Option<Move>, SessionError> {
        let Some(mv) = self.ledger.last().copied() else {
            return Ok(None);
        };
        let changes = self.oracle.unapply_move(mv)?;
        self.ledger.pop();
        let events = self.occupancy.apply_changes(&changes);
        self.events.extend(events);
        Ok(Some(mv))
    }

    fn unwind_ledger(&mut self) -> Result<(), SessionError> {
        while self.unapply_last()?.is_some() {}
        Ok(())
    }
}

/// Loser of a game that ended without mate: the side with fewer pieces left
/// on the board. Equal counts go against Black.
pub fn draw_loser(white_pieces: usize, black_pieces: usize) -> Color {
    if white_pieces < black_pieces {
        Color::White
    } else {
        Color::Black
    }
}
