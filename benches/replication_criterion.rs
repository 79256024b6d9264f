use std::hint::black_box;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tabletop_chess::config::SessionConfig;
use tabletop_chess::engines::engine_trait::EngineKind;
use tabletop_chess::engines::opponent_driver::DriverMode;
use tabletop_chess::moves::move_descriptions::Move;
use tabletop_chess::oracle::rules_oracle::{RulesOracle, StandardRules};
use tabletop_chess::session::network_board::NetworkBoard;
use tabletop_chess::session::options::GameMode;
use tabletop_chess::sync::local_network::LocalNetwork;
use tabletop_chess::sync::move_ledger::MoveLedgerReplicator;
use tabletop_chess::sync::transport::{NetCommand, NetEvent};

const PLIES: usize = 40;

fn bench_config() -> SessionConfig {
    SessionConfig {
        driver_mode: DriverMode::Inline,
        engine: EngineKind::Random,
        engine_seed: Some(5),
        ai_settle_delay_s: 0.0,
        ai_think_time_s: 0.0,
        ..SessionConfig::default()
    }
}

/// Frames until the first participant has `PLIES` moves or the game ends.
fn play_table(peers: u64) -> usize {
    let config = bench_config();
    let dt = config.tick_delta_s();
    let network = LocalNetwork::new();
    let mut table: Vec<_> = (1..=peers)
        .map(|id| NetworkBoard::new(network.connect(id), &config))
        .collect();
    table[0]
        .start_game(GameMode::AIvsAI)
        .expect("start should succeed");

    let mut frames = 0;
    while frames < 10_000 {
        for peer in table.iter_mut() {
            peer.update(dt).expect("update should succeed");
        }
        network.flush();
        frames += 1;
        let session = table[0].session();
        if session.ledger().len() >= PLIES || session.is_game_over() {
            break;
        }
    }
    frames
}

fn bench_replicated_game(c: &mut Criterion) {
    let mut group = c.benchmark_group("replicated_game");
    group.measurement_time(Duration::from_secs(4));
    group.sample_size(20);
    for peers in [2u64, 4, 8] {
        group.throughput(Throughput::Elements(PLIES as u64));
        group.bench_with_input(BenchmarkId::from_parameter(peers), &peers, |b, &peers| {
            b.iter(|| black_box(play_table(black_box(peers))));
        });
    }
    group.finish();
}

fn sample_ledger(plies: usize) -> Vec<Move> {
    let mut oracle = StandardRules::new();
    let mut moves = Vec::with_capacity(plies);
    for _ in 0..plies {
        let legal = oracle.legal_moves().expect("legal moves should generate");
        let Some(mv) = legal.first().copied() else {
            break;
        };
        oracle.apply_move(mv).expect("move should apply");
        moves.push(mv);
    }
    moves
}

/// Owner pushes one move at a time; an observer folds in each echo.
fn bench_ledger_diffs(c: &mut Criterion) {
    let ledger = sample_ledger(PLIES);
    let mut group = c.benchmark_group("ledger_diff");
    group.throughput(Throughput::Elements(ledger.len() as u64));
    group.bench_function("push_and_observe", |b| {
        b.iter(|| {
            let mut owner = MoveLedgerReplicator::new(1, 3);
            let mut observer = MoveLedgerReplicator::new(1, 3);
            for len in 1..=ledger.len() {
                owner.push_diff(black_box(&ledger[..len]), 1);
                for command in owner.drain_commands() {
                    if let NetCommand::ListAdd {
                        object,
                        channel,
                        index,
                        value,
                    } = command
                    {
                        let event = NetEvent::ListAdd {
                            object,
                            channel,
                            origin: 1,
                            index,
                            value,
                        };
                        black_box(observer.apply_event(2, &event));
                    }
                }
            }
            black_box(observer.mirror_len())
        });
    });
    group.finish();
}

criterion_group!(replication_benches, bench_replicated_game, bench_ledger_diffs);
criterion_main!(replication_benches);
