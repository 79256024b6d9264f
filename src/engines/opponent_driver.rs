//! Asynchronous computer-opponent move production.
//!
//! A search request snapshots the live oracle into a shadow copy and hands it
//! to the engine, either on a dedicated worker thread or inline on the
//! caller's thread. Results come back through `poll`, tagged with the
//! generation they were requested under; anything from an older generation
//! (the game was reset or the request abandoned) is dropped.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engines::engine_trait::Engine;
use crate::errors::EngineError;
use crate::game_state::chess_types::Color;
use crate::moves::move_descriptions::Move;
use crate::oracle::rules_oracle::RulesOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverMode {
    /// Search on a worker thread.
    #[default]
    Threaded,
    /// Search synchronously inside `request_move`.
    Inline,
}

struct SearchJob {
    generation: u64,
    oracle: Box<dyn RulesOracle>,
}

struct SearchReply {
    generation: u64,
    result: Result<Move, EngineError>,
}

struct Worker {
    jobs: Option<Sender<SearchJob>>,
    replies: Receiver<SearchReply>,
    handle: Option<JoinHandle<()>>,
}

enum Backend {
    Inline(Box<dyn Engine>),
    Threaded(Worker),
}

struct PendingSearch {
    generation: u64,
    color: Color,
    requested_at: f64,
    result: Option<Result<Move, EngineError>>,
}

/// A finished search, ready to be applied by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpponentReply {
    pub color: Color,
    pub result: Result<Move, EngineError>,
}

pub struct OpponentDriver {
    backend: Backend,
    engine_name: String,
    generation: u64,
    pending: Option<PendingSearch>,
    think_time_s: f64,
}

impl OpponentDriver {
    pub fn new(engine: Box<dyn Engine>, mode: DriverMode, think_time_s: f64) -> Self {
        let engine_name = engine.name().to_owned();
        let backend = match mode {
            DriverMode::Inline => Backend::Inline(engine),
            DriverMode::Threaded => Backend::Threaded(spawn_worker(engine)),
        };
        Self {
            backend,
            engine_name,
            generation: 0,
            pending: None,
            think_time_s: think_time_s.max(0.0),
        }
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    #[inline]
    pub fn is_searching(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a search for `color` on a shadow copy of `oracle`.
    pub fn request_move(
        &mut self,
        oracle: &dyn RulesOracle,
        color: Color,
        now: f64,
    ) -> Result<(), EngineError> {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let mut shadow = oracle.shadow_copy();

        let result = match &mut self.backend {
            Backend::Inline(engine) => Some(engine.choose_move(shadow.as_mut())),
            Backend::Threaded(worker) => {
                let jobs = worker.jobs.as_ref().ok_or(EngineError::WorkerDisconnected)?;
                jobs.send(SearchJob {
                    generation,
                    oracle: shadow,
                })
                .map_err(|_| EngineError::WorkerDisconnected)?;
                None
            }
        };

        debug!(engine = %self.engine_name, ?color, generation, "opponent search requested");
        self.pending = Some(PendingSearch {
            generation,
            color,
            requested_at: now,
            result,
        });
        Ok(())
    }

    /// Drop any outstanding search; a late reply will be discarded.
    pub fn abandon(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(generation = pending.generation, "opponent search abandoned");
        }
        self.generation = self.generation.wrapping_add(1);
    }

    /// Collect a finished search once the minimum think time has passed.
    pub fn poll(&mut self, now: f64) -> Option<OpponentReply> {
        if let Backend::Threaded(worker) = &mut self.backend {
            loop {
                match worker.replies.try_recv() {
                    Ok(reply) => match self.pending.as_mut() {
                        Some(pending) if pending.generation == reply.generation => {
                            pending.result = Some(reply.result);
                        }
                        _ => debug!(generation = reply.generation, "stale opponent reply dropped"),
                    },
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if let Some(pending) = self.pending.as_mut() {
                            if pending.result.is_none() {
                                warn!("opponent worker disconnected mid-search");
                                pending.result = Some(Err(EngineError::WorkerDisconnected));
                            }
                        }
                        break;
                    }
                }
            }
        }

        let ready = self
            .pending
            .as_ref()
            .is_some_and(|p| p.result.is_some() && now - p.requested_at >= self.think_time_s);
        if !ready {
            return None;
        }

        let pending = self.pending.take()?;
        Some(OpponentReply {
            color: pending.color,
            result: pending.result?,
        })
    }

    pub fn new_game(&mut self) {
        self.abandon();
        if let Backend::Inline(engine) = &mut self.backend {
            engine.new_game();
        }
    }
}

impl Drop for OpponentDriver {
    fn drop(&mut self) {
        if let Backend::Threaded(worker) = &mut self.backend {
            // Closing the job channel ends the worker loop.
            worker.jobs.take();
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!("opponent worker panicked");
                }
            }
        }
    }
}

fn spawn_worker(mut engine: Box<dyn Engine>) -> Worker {
    let (job_tx, job_rx) = mpsc::channel::<SearchJob>();
    let (reply_tx, reply_rx) = mpsc::channel::<SearchReply>();

    let handle = thread::spawn(move || {
        while let Ok(mut job) = job_rx.recv() {
            let result = engine.choose_move(job.oracle.as_mut());
            let reply = SearchReply {
                generation: job.generation,
                result,
            };
            if reply_tx.send(reply).is_err() {
                break;
            }
        }
    });

    Worker {
        jobs: Some(job_tx),
        replies: reply_rx,
        handle: Some(handle),
    }
}
