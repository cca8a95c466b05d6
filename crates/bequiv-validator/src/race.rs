//! The alias-strategy race.
//!
//! Runs the cell-based and flat encodings of the same obligation
//! concurrently; the first non-error result wins and the loser is
//! cancelled through a broadcast channel. Results from cancelled or
//! failed entrants are discarded, so a strategy blowing its search bound
//! never surfaces as an error when the other strategy has an answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::checker::{check_obligation, Callback, Job, SolverFactory};
use crate::config::{AliasStrategy, CheckerConfig};
use crate::result::CheckResult;

/// Kick off the race on `runtime` and return immediately; `callback`
/// fires from a runtime thread when a verdict is in.
pub(crate) fn spawn_race(
    runtime: &tokio::runtime::Runtime,
    factory: SolverFactory,
    config: CheckerConfig,
    job: Job,
    callback: Callback,
    token: u64,
) {
    runtime.spawn(async move {
        let result = run_race(factory, config, job).await;
        callback(result, token);
    });
}

async fn run_race(factory: SolverFactory, config: CheckerConfig, job: Job) -> CheckResult {
    let started = Instant::now();
    let (cancel_tx, _) = broadcast::channel::<()>(1);

    let mut entrants = JoinSet::new();
    for kind in AliasStrategy::race_entrants() {
        let factory = Arc::clone(&factory);
        let config = config.clone();
        let job = job.clone();
        let mut cancel_rx = cancel_tx.subscribe();

        entrants.spawn(async move {
            let work = tokio::task::spawn_blocking(move || {
                let mut solver = (factory)(kind);
                check_obligation(&config, kind, solver.as_mut(), &job)
            });
            tokio::select! {
                joined = work => match joined {
                    Ok(result) => (kind, result),
                    Err(error) => (
                        kind,
                        CheckResult::error(
                            format!("strategy task failed: {error}"),
                            Duration::ZERO,
                        ),
                    ),
                },
                _ = cancel_rx.recv() => {
                    (kind, CheckResult::error("cancelled", Duration::ZERO))
                }
            }
        });
    }

    // Join in completion order: a slow first entrant must not delay the
    // verdict or the cancellation of the other entrants.
    let mut winner: Option<CheckResult> = None;
    let mut fallback: Option<CheckResult> = None;
    while let Some(joined) = entrants.join_next().await {
        match joined {
            Ok((kind, result)) => {
                if winner.is_none() && result.is_definitive() {
                    debug!(?kind, elapsed = ?started.elapsed(), "strategy won the race");
                    winner = Some(result);
                    let _ = cancel_tx.send(());
                } else if fallback.is_none() {
                    fallback = Some(result);
                }
            }
            Err(error) => warn!(%error, "race task failed"),
        }
    }

    winner.or(fallback).unwrap_or_else(|| {
        CheckResult::error("no strategy produced a result", started.elapsed())
    })
}
