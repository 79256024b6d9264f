//! Plays a replicated game between several participants on one in-process
//! authority and prints the resulting ledger as PGN.

use std::error::Error;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tabletop_chess::config::SessionConfig;
use tabletop_chess::engines::opponent_driver::DriverMode;
use tabletop_chess::errors::SessionError;
use tabletop_chess::session::network_board::NetworkBoard;
use tabletop_chess::session::options::GameMode;
use tabletop_chess::sync::local_network::{LocalLink, LocalNetwork};
use tabletop_chess::sync::transport::ParticipantId;

#[derive(Parser, Debug)]
#[command(name = "tabletop-chess", version)]
#[command(about = "Replicated chess board demo over an in-process authority")]
struct Args {
    /// Session configuration file (TOML)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Participants sharing the board
    #[arg(short, long, default_value_t = 2)]
    peers: u64,

    /// hvh, hva, avh or ava
    #[arg(short, long, default_value = "ava", value_parser = parse_mode)]
    mode: GameMode,

    /// Seed for engines and for the scripted human players
    #[arg(short, long)]
    seed: Option<u64>,

    /// Stop after this many plies
    #[arg(long, default_value_t = 120)]
    max_plies: usize,
}

fn parse_mode(text: &str) -> Result<GameMode, String> {
    match GameMode::parse(text) {
        Some(GameMode::NotStarted) | None => Err(format!("unknown game mode `{text}`")),
        Some(mode) => Ok(mode),
    }
}

const MAX_FRAMES: usize = 200_000;
const SETTLE_FRAMES: usize = 60;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if args.seed.is_some() {
        config.engine_seed = args.seed;
    }
    let dt = config.tick_delta_s();

    let network = LocalNetwork::new();
    let mut peers: Vec<NetworkBoard<LocalLink>> = (1..=args.peers.max(1))
        .map(|id: ParticipantId| NetworkBoard::new(network.connect(id), &config))
        .collect();
    info!(peers = peers.len(), mode = ?args.mode, engine = peers[0].session().engine_name(), "table ready");

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    peers[0].start_game(args.mode)?;
    let mut frames_left = MAX_FRAMES;
    let mut settle = SETTLE_FRAMES;
    while frames_left > 0 && settle > 0 {
        frames_left -= 1;
        for peer in peers.iter_mut() {
            peer.update(dt)?;
        }
        network.flush();

        let session = peers[0].session();
        if session.is_game_over() || session.ledger().len() >= args.max_plies {
            settle -= 1;
            continue;
        }
        play_human_turn(&mut peers, &mut rng)?;

        if config.driver_mode == DriverMode::Threaded {
            thread::sleep(Duration::from_millis(1));
        }
    }

    let reference = peers[0].session().ledger().to_vec();
    for peer in &peers[1..] {
        if peer.session().ledger() != reference.as_slice() {
            warn!(
                participant = peer.local_id(),
                plies = peer.session().ledger().len(),
                expected = reference.len(),
                "participant ledger diverged"
            );
        }
    }
    if let Some(loser) = peers[0].session().player_lost() {
        info!(%loser, plies = reference.len(), "game over");
    }

    print!("{}", peers[0].session().export_pgn(Local::now().date_naive())?);
    Ok(())
}

/// Let a rotating participant play a random legal move for a human side.
fn play_human_turn(
    peers: &mut [NetworkBoard<LocalLink>],
    rng: &mut StdRng,
) -> Result<(), SessionError> {
    let ply = peers[0].session().ledger().len();
    let index = ply % peers.len();
    let session = peers[index].session();
    let side = session.oracle().side_to_move();
    if !session.is_idle()
        || !session.is_move_confirmed()
        || session.is_game_over()
        || session.game_mode().is_computer(side)
    {
        return Ok(());
    }

    let legal = session.oracle().legal_moves()?;
    let Some(mv) = legal.as_slice().choose(rng).copied() else {
        return Ok(());
    };
    match peers[index].try_movement(mv.start_square(), mv.target_square()) {
        Ok(_) => Ok(()),
        Err(SessionError::OwnershipUnavailable) => Ok(()),
        Err(err) => Err(err),
    }
}
