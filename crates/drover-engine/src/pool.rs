//! Worker-thread hosting for fan-out/fan-in replica execution.
//!
//! Each worker thread owns its backend exclusively (moved in via
//! `thread::spawn`). No shared state on the hot path — requests arrive
//! via a bounded crossbeam channel and replies go back the same way,
//! one outstanding request per replica. A fan-out sends to every
//! worker before the fan-in receives from any, and the fan-in always
//! completes the full join before reporting a failure, so a tick never
//! observes a partially-stepped pool.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::thread::JoinHandle;

use drover_backend::{Backend, ReplicaReset, ReplicaStep};
use drover_core::{BackendError, LocalAgentId, ReplicaId};
use drover_space::Value;

use crate::config::ConfigError;

pub(crate) enum Request {
    Reset {
        seed: Option<u64>,
    },
    Step {
        ids: Vec<LocalAgentId>,
        actions: Vec<Value>,
    },
    Close,
}

pub(crate) enum Response {
    Reset(Result<ReplicaReset, BackendError>),
    Step(Result<ReplicaStep, BackendError>),
    Closed,
}

struct Worker {
    requests: Sender<Request>,
    responses: Receiver<Response>,
    handle: Option<JoinHandle<()>>,
}

/// One worker thread per replica, driven in lockstep by the
/// orchestrator.
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    /// Move each backend onto its own worker thread.
    pub(crate) fn spawn(backends: Vec<Box<dyn Backend>>) -> Result<Self, ConfigError> {
        let mut workers = Vec::with_capacity(backends.len());
        for (i, backend) in backends.into_iter().enumerate() {
            let (request_tx, request_rx) = bounded::<Request>(1);
            let (response_tx, response_rx) = bounded::<Response>(1);
            let handle = std::thread::Builder::new()
                .name(format!("drover-replica-{i}"))
                .spawn(move || worker_loop(backend, &request_rx, &response_tx))
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    reason: e.to_string(),
                })?;
            workers.push(Worker {
                requests: request_tx,
                responses: response_rx,
                handle: Some(handle),
            });
        }
        Ok(Self { workers })
    }

    /// Reset every replica, joining all replies before reporting the
    /// first failure.
    pub(crate) fn reset_all(
        &mut self,
        seeds: &[Option<u64>],
    ) -> Result<Vec<ReplicaReset>, (ReplicaId, BackendError)> {
        debug_assert_eq!(seeds.len(), self.workers.len());
        let sent: Vec<bool> = self
            .workers
            .iter()
            .zip(seeds)
            .map(|(worker, &seed)| worker.requests.send(Request::Reset { seed }).is_ok())
            .collect();
        let results = self.join_all(&sent, |response| match response {
            Response::Reset(r) => Some(r),
            _ => None,
        });
        first_failure(results)
    }

    /// Step every replica with its own action batch, joining all
    /// replies before reporting the first failure.
    pub(crate) fn step_all(
        &mut self,
        batches: Vec<(Vec<LocalAgentId>, Vec<Value>)>,
    ) -> Result<Vec<ReplicaStep>, (ReplicaId, BackendError)> {
        debug_assert_eq!(batches.len(), self.workers.len());
        let sent: Vec<bool> = self
            .workers
            .iter()
            .zip(batches)
            .map(|(worker, (ids, actions))| {
                worker.requests.send(Request::Step { ids, actions }).is_ok()
            })
            .collect();
        let results = self.join_all(&sent, |response| match response {
            Response::Step(r) => Some(r),
            _ => None,
        });
        first_failure(results)
    }

    /// Close every replica and join its worker thread. Idempotent.
    pub(crate) fn close_all(&mut self) {
        for mut worker in self.workers.drain(..) {
            if worker.requests.send(Request::Close).is_ok() {
                let _ = worker.responses.recv();
            }
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn join_all<T>(
        &self,
        sent: &[bool],
        extract: impl Fn(Response) -> Option<Result<T, BackendError>>,
    ) -> Vec<Result<T, BackendError>> {
        self.workers
            .iter()
            .enumerate()
            .map(|(i, worker)| {
                if !sent[i] {
                    return Err(disconnected());
                }
                match worker.responses.recv() {
                    Ok(response) => extract(response).unwrap_or_else(|| {
                        Err(BackendError::Failure {
                            reason: "protocol mismatch from replica worker".into(),
                        })
                    }),
                    Err(_) => Err(disconnected()),
                }
            })
            .collect()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn worker_loop(
    mut backend: Box<dyn Backend>,
    requests: &Receiver<Request>,
    responses: &Sender<Response>,
) {
    // Descriptors captured once; a backend whose spaces drift after a
    // later reset is reported as SpaceChanged.
    let obs_space = backend.observation_space().clone();
    let act_space = backend.action_space().clone();

    while let Ok(request) = requests.recv() {
        match request {
            Request::Reset { seed } => {
                let result = backend.reset(seed).and_then(|reset| {
                    if backend.observation_space() != &obs_space
                        || backend.action_space() != &act_space
                    {
                        Err(BackendError::SpaceChanged)
                    } else {
                        Ok(reset)
                    }
                });
                if responses.send(Response::Reset(result)).is_err() {
                    break;
                }
            }
            Request::Step { ids, actions } => {
                let result = backend.step(&ids, &actions);
                if responses.send(Response::Step(result)).is_err() {
                    break;
                }
            }
            Request::Close => {
                backend.close();
                let _ = responses.send(Response::Closed);
                break;
            }
        }
    }
}

fn disconnected() -> BackendError {
    BackendError::Failure {
        reason: "replica worker disconnected".into(),
    }
}

/// Collapse per-replica results, surfacing the first failure with its
/// replica index. Called only after every reply has been joined.
fn first_failure<T>(
    results: Vec<Result<T, BackendError>>,
) -> Result<Vec<T>, (ReplicaId, BackendError)> {
    let mut ok = Vec::with_capacity(results.len());
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => ok.push(value),
            Err(error) => return Err((ReplicaId(i as u32), error)),
        }
    }
    Ok(ok)
}
