//! The obligation checker.
//!
//! An obligation says: for every pair of executions of the target and
//! rewrite along the given paths whose starting states satisfy the
//! hypothesis invariant, the final states satisfy the conclusion
//! invariant. The checker encodes both executions symbolically, conjoins
//! the hypothesis with the negated conclusion, and asks a solver:
//! unsatisfiable means the obligation holds, a model is a counterexample.
//!
//! Results are delivered through a callback carrying the caller's token.
//! Implementations may invoke the callback before `check` returns or from
//! another thread later; it is invoked exactly once either way.
//! [`ObligationChecker::check_wait`] adapts either shape back into a
//! blocking call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bequiv_cfg::{BlockId, Cfg, CfgPath};
use bequiv_smt::{Model, SmtValue, Solver, SolverOutcome, Z3Solver};
use bequiv_sym::{MemoryStrategy, StrategyKind, SymBool, SymBv, SymbolicMemory};
use tracing::{debug, info, warn};

use crate::config::CheckerConfig;
use crate::error::ValidatorError;
use crate::executor::execute_path;
use crate::filter::{DefaultFilter, Filter};
use crate::invariant::{Invariant, StatePair};
use crate::race;
use crate::result::CheckResult;
use crate::state::CpuState;

/// Result delivery. Called exactly once with the result and the token the
/// caller passed to `check`.
pub type Callback = Box<dyn FnOnce(CheckResult, u64) + Send>;

/// Everything needed to discharge one obligation, owned so it can move
/// across threads.
#[derive(Debug, Clone)]
pub struct Job {
    pub target: Cfg,
    pub rewrite: Cfg,
    /// Blocks the invariants attach to, carried for diagnostics.
    pub target_block: BlockId,
    pub rewrite_block: BlockId,
    pub target_path: CfgPath,
    pub rewrite_path: CfgPath,
    pub assume: Arc<dyn Invariant>,
    pub prove: Arc<dyn Invariant>,
    pub testcases: Vec<(CpuState, CpuState)>,
}

pub trait ObligationChecker {
    /// Discharge one obligation. The callback fires exactly once, inline
    /// or from a worker thread.
    #[allow(clippy::too_many_arguments)]
    fn check(
        &mut self,
        target: &Cfg,
        rewrite: &Cfg,
        target_block: BlockId,
        rewrite_block: BlockId,
        target_path: &CfgPath,
        rewrite_path: &CfgPath,
        assume: &Arc<dyn Invariant>,
        prove: &Arc<dyn Invariant>,
        testcases: &[(CpuState, CpuState)],
        callback: Callback,
        token: u64,
    );

    fn filter(&self) -> &dyn Filter;

    /// Blocking adapter over `check`, correct for both inline and deferred
    /// callback delivery.
    #[allow(clippy::too_many_arguments)]
    fn check_wait(
        &mut self,
        target: &Cfg,
        rewrite: &Cfg,
        target_block: BlockId,
        rewrite_block: BlockId,
        target_path: &CfgPath,
        rewrite_path: &CfgPath,
        assume: &Arc<dyn Invariant>,
        prove: &Arc<dyn Invariant>,
        testcases: &[(CpuState, CpuState)],
        token: u64,
    ) -> CheckResult {
        let done = Arc::new(AtomicBool::new(false));
        let slot: Arc<Mutex<Option<CheckResult>>> = Arc::new(Mutex::new(None));
        {
            let done = Arc::clone(&done);
            let slot = Arc::clone(&slot);
            let callback: Callback = Box::new(move |result, _token| {
                *lock_or_recover(&slot) = Some(result);
                done.store(true, Ordering::Release);
            });
            self.check(
                target,
                rewrite,
                target_block,
                rewrite_block,
                target_path,
                rewrite_path,
                assume,
                prove,
                testcases,
                callback,
                token,
            );
        }
        while !done.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
        let result = lock_or_recover(&slot)
            .take()
            .unwrap_or_else(|| {
                CheckResult::error("callback completed without a result", Duration::ZERO)
            });
        result
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Bytes of one recorded access, bound to named variables in the start
/// and end memories so a model yields concrete counterexample memory.
struct DerefBinding {
    alias: SymBv,
    init: Vec<SymBv>,
    fin: Vec<SymBv>,
}

fn bind_derefs(
    memory: &MemoryStrategy,
    prefix: &str,
    assertions: &mut Vec<SymBool>,
) -> Vec<DerefBinding> {
    let start = memory.start_variable();
    let end = memory.end_variable();
    let mut bindings = Vec::new();
    for (k, (alias, size)) in memory.access_list().iter().enumerate() {
        let mut init = Vec::new();
        let mut fin = Vec::new();
        for i in 0..*size {
            let address = alias.offset(i as i64);
            let init_var = SymBv::var(format!("{prefix}_deref{k}_init{i}"), 8);
            assertions.push(init_var.equals(&start.select(address.clone())));
            init.push(init_var);
            let fin_var = SymBv::var(format!("{prefix}_deref{k}_fin{i}"), 8);
            assertions.push(fin_var.equals(&end.select(address)));
            fin.push(fin_var);
        }
        bindings.push(DerefBinding {
            alias: alias.clone(),
            init,
            fin,
        });
    }
    bindings
}

#[derive(Clone, Copy)]
enum Epoch {
    Initial,
    Final,
}

fn model_u64(model: &Model, name: &str) -> u64 {
    model.get(name).and_then(SmtValue::as_u64).unwrap_or(0)
}

/// Rebuild a concrete machine state from a model. Variables the solver
/// left unassigned default to zero.
fn extract_state(
    model: &Model,
    prefix: &str,
    cfg: &Cfg,
    derefs: &[DerefBinding],
    epoch: Epoch,
    ghosts: bool,
) -> CpuState {
    let mut state = CpuState::default();
    for (i, reg) in state.regs.iter_mut().enumerate() {
        let name = match epoch {
            Epoch::Initial => format!("{prefix}_r{i}_0"),
            Epoch::Final => format!("{prefix}_rf{i}"),
        };
        *reg = model_u64(model, &name);
    }
    if ghosts {
        for id in cfg.block_ids() {
            let name = match epoch {
                Epoch::Initial => format!("{prefix}_g{id}_0"),
                Epoch::Final => format!("{prefix}_gf{id}"),
            };
            state.ghosts.insert(id, model_u64(model, &name));
        }
    }
    for binding in derefs {
        let Some(alias_name) = binding.alias.var_name() else {
            continue;
        };
        let address = model_u64(model, alias_name);
        let bytes = match epoch {
            Epoch::Initial => &binding.init,
            Epoch::Final => &binding.fin,
        };
        for (i, byte) in bytes.iter().enumerate() {
            if let Some(SmtValue::BitVec { value, .. }) =
                byte.var_name().and_then(|name| model.get(name))
            {
                state.memory.insert(address.wrapping_add(i as u64), *value as u8);
            }
        }
    }
    state
}

/// Discharge one obligation with one memory strategy and one solver.
///
/// This is the synchronous core shared by the plain strategies and the
/// race; it never panics, turning every failure into an error result.
pub fn check_obligation(
    config: &CheckerConfig,
    kind: StrategyKind,
    solver: &mut dyn Solver,
    job: &Job,
) -> CheckResult {
    let started = Instant::now();

    // A testcase that concretely satisfies the hypothesis and falsifies
    // the conclusion refutes the obligation without a solver round-trip.
    // The starting states stand in for the finals here: the refutation is
    // already concrete.
    for (target, rewrite) in &job.testcases {
        if job.assume.eval_concrete(target, rewrite) == Some(true)
            && job.prove.eval_concrete(target, rewrite) == Some(false)
        {
            debug!("testcase refutes obligation");
            return CheckResult::counterexample(
                target.clone(),
                rewrite.clone(),
                target.clone(),
                rewrite.clone(),
                started.elapsed(),
            );
        }
    }

    match encode_and_solve(config, kind, solver, job, started) {
        Ok(result) => result,
        Err(error) => {
            warn!(%error, "obligation check failed");
            CheckResult::error(error.to_string(), started.elapsed())
        }
    }
}

fn encode_and_solve(
    config: &CheckerConfig,
    kind: StrategyKind,
    solver: &mut dyn Solver,
    job: &Job,
    started: Instant,
) -> Result<CheckResult, ValidatorError> {
    let mut t_mem = MemoryStrategy::new(kind, config.mem_config(), "t_mem");
    let mut r_mem = MemoryStrategy::new(kind, config.mem_config(), "r_mem");

    let t_exec = execute_path(&job.target, &job.target_path, "t", &mut t_mem, config)?;
    let r_exec = execute_path(&job.rewrite, &job.rewrite_path, "r", &mut r_mem, config)?;
    t_mem.finalize();
    r_mem.finalize();

    let start_eq = t_mem.start_variable().equals(&r_mem.start_variable());
    let end_eq = t_mem.equality_constraint(&mut r_mem)?;

    let mut assertions = Vec::new();
    let assume_pair = StatePair {
        target: &t_exec.initial,
        rewrite: &r_exec.initial,
        memory_eq: &start_eq,
    };
    assertions.push(job.assume.to_formula(&assume_pair));

    let prove_pair = StatePair {
        target: &t_exec.finals,
        rewrite: &r_exec.finals,
        memory_eq: &end_eq,
    };
    if config.fixpoint_up {
        assertions.push(job.assume.to_formula(&prove_pair));
    }
    assertions.push(SymBool::not(job.prove.to_formula(&prove_pair)));

    assertions.extend(t_exec.constraints);
    assertions.extend(r_exec.constraints);

    let t_derefs = bind_derefs(&t_mem, "t", &mut assertions);
    let r_derefs = bind_derefs(&r_mem, "r", &mut assertions);

    // Memory constraints last: equality generation may have added to them.
    assertions.extend(t_mem.generated_constraints());
    assertions.extend(r_mem.generated_constraints());

    debug!(
        assertions = assertions.len(),
        ?kind,
        solver = solver.name(),
        "dispatching obligation"
    );
    match solver.check_sat(&assertions)? {
        SolverOutcome::Unsat => Ok(CheckResult::verified(started.elapsed())),
        SolverOutcome::Sat(model) => {
            let ghosts = config.basic_block_ghosts;
            let target = extract_state(&model, "t", &job.target, &t_derefs, Epoch::Initial, ghosts);
            let rewrite =
                extract_state(&model, "r", &job.rewrite, &r_derefs, Epoch::Initial, ghosts);
            let target_final =
                extract_state(&model, "t", &job.target, &t_derefs, Epoch::Final, ghosts);
            let rewrite_final =
                extract_state(&model, "r", &job.rewrite, &r_derefs, Epoch::Final, ghosts);
            Ok(CheckResult::counterexample(
                target,
                rewrite,
                target_final,
                rewrite_final,
                started.elapsed(),
            ))
        }
        SolverOutcome::Unknown(reason) => Ok(CheckResult::error(
            format!("solver returned unknown: {reason}"),
            started.elapsed(),
        )),
    }
}

/// Factory handing out a fresh solver per check; keyed by strategy so the
/// race can give each entrant its own backend.
pub type SolverFactory = Arc<dyn Fn(StrategyKind) -> Box<dyn Solver> + Send + Sync>;

/// The production checker: SMT encoding over a configurable memory
/// strategy, with the alias race run on a lazily created tokio runtime.
pub struct SmtObligationChecker {
    config: CheckerConfig,
    filter: Box<dyn Filter>,
    solver_factory: SolverFactory,
    runtime: Option<tokio::runtime::Runtime>,
}

impl SmtObligationChecker {
    pub fn new(config: CheckerConfig) -> Self {
        let timeout = config.solver_timeout;
        Self::with_solver_factory(
            config,
            Arc::new(move |_| -> Box<dyn Solver> {
                Box::new(Z3Solver::new().timeout(timeout))
            }),
        )
    }

    pub fn with_solver_factory(config: CheckerConfig, solver_factory: SolverFactory) -> Self {
        Self {
            config,
            filter: Box::new(DefaultFilter),
            solver_factory,
            runtime: None,
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filter = filter;
        self
    }

    fn runtime(&mut self) -> std::io::Result<&tokio::runtime::Runtime> {
        if self.runtime.is_none() {
            self.runtime = Some(
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()?,
            );
        }
        match &self.runtime {
            Some(runtime) => Ok(runtime),
            None => Err(std::io::Error::other("runtime unavailable")),
        }
    }
}

impl ObligationChecker for SmtObligationChecker {
    fn check(
        &mut self,
        target: &Cfg,
        rewrite: &Cfg,
        target_block: BlockId,
        rewrite_block: BlockId,
        target_path: &CfgPath,
        rewrite_path: &CfgPath,
        assume: &Arc<dyn Invariant>,
        prove: &Arc<dyn Invariant>,
        testcases: &[(CpuState, CpuState)],
        callback: Callback,
        token: u64,
    ) {
        let started = Instant::now();
        if let Err(reason) = self.filter.accept(target, rewrite, target_path, rewrite_path) {
            warn!(token, %reason, "obligation rejected by filter");
            callback(
                CheckResult::error(format!("rejected: {reason}"), started.elapsed()),
                token,
            );
            return;
        }

        let job = Job {
            target: target.clone(),
            rewrite: rewrite.clone(),
            target_block,
            rewrite_block,
            target_path: target_path.clone(),
            rewrite_path: rewrite_path.clone(),
            assume: Arc::clone(assume),
            prove: Arc::clone(prove),
            testcases: testcases.to_vec(),
        };

        match self.config.alias_strategy.memory_kind() {
            Some(kind) => {
                let mut solver = (self.solver_factory)(kind);
                let result = check_obligation(&self.config, kind, solver.as_mut(), &job);
                info!(token, %result, "obligation checked");
                callback(result, token);
            }
            None => {
                let factory = Arc::clone(&self.solver_factory);
                let config = self.config.clone();
                match self.runtime() {
                    Ok(runtime) => race::spawn_race(runtime, factory, config, job, callback, token),
                    Err(error) => callback(
                        CheckResult::error(
                            format!("failed to start runtime: {error}"),
                            started.elapsed(),
                        ),
                        token,
                    ),
                }
            }
        }
    }

    fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }
}
