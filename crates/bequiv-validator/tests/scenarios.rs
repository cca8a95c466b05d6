//! End-to-end obligation checks against scripted solver backends.

use std::sync::Arc;
use std::time::Duration;

use bequiv_cfg::{Block, Cfg, CfgBuilder, CfgPath, Instr, MemRef, Reg};
use bequiv_smt::{
    Model, ScriptedSolver, SmtValue, Solver, SolverOutcome, SolverResult,
};
use bequiv_sym::SymBool;
use bequiv_validator::{
    AliasStrategy, CheckerConfig, CheckResult, CpuState, Invariant, ObligationChecker,
    PathLengthFilter, RegisterEqInvariant, SmtObligationChecker, SolverFactory, TrueInvariant,
};

fn empty_cfg() -> Cfg {
    CfgBuilder::new()
        .block(Block {
            id: 0,
            instrs: Vec::new(),
            cond: None,
        })
        .build()
        .unwrap()
}

/// One block storing the low 4 bytes of a constant to `addr`.
fn store_cfg(value: u64, addr: MemRef) -> Cfg {
    CfgBuilder::new()
        .block(Block {
            id: 0,
            instrs: vec![
                Instr::Const {
                    dst: Reg(0),
                    value,
                },
                Instr::Store {
                    src: Reg(0),
                    addr,
                    size: 4,
                },
            ],
            cond: None,
        })
        .build()
        .unwrap()
}

fn literal(addr: i64) -> MemRef {
    MemRef {
        base: None,
        disp: addr,
    }
}

fn check(
    checker: &mut SmtObligationChecker,
    target: &Cfg,
    rewrite: &Cfg,
    assume: Arc<dyn Invariant>,
    prove: Arc<dyn Invariant>,
    testcases: &[(CpuState, CpuState)],
) -> CheckResult {
    let path: CfgPath = vec![0];
    checker.check_wait(target, rewrite, 0, 0, &path, &path, &assume, &prove, testcases, 7)
}

fn scripted_factory(outcome: SolverOutcome) -> SolverFactory {
    Arc::new(move |_| -> Box<dyn Solver> {
        Box::new(ScriptedSolver::new([outcome.clone()]))
    })
}

fn exhausted_factory() -> SolverFactory {
    Arc::new(|_| -> Box<dyn Solver> { Box::new(ScriptedSolver::new([])) })
}

#[test]
fn test_trivial_paths_with_true_invariants_verify() {
    let mut checker = SmtObligationChecker::with_solver_factory(
        CheckerConfig::default(),
        scripted_factory(SolverOutcome::Unsat),
    );
    let cfg = empty_cfg();
    let result = check(
        &mut checker,
        &cfg,
        &cfg,
        Arc::new(TrueInvariant),
        Arc::new(TrueInvariant),
        &[],
    );
    assert!(result.verified, "got {result}");
}

#[test]
fn test_matching_writes_to_same_address_verify_under_cells() {
    let config = CheckerConfig {
        alias_strategy: AliasStrategy::Arm,
        ..CheckerConfig::default()
    };
    let mut checker = SmtObligationChecker::with_solver_factory(
        config,
        scripted_factory(SolverOutcome::Unsat),
    );
    let target = store_cfg(0xAABBCCDD, literal(0x4000));
    let rewrite = store_cfg(0xAABBCCDD, literal(0x4000));
    let result = check(
        &mut checker,
        &target,
        &rewrite,
        Arc::new(TrueInvariant),
        Arc::new(TrueInvariant),
        &[],
    );
    assert!(result.verified, "got {result}");
}

#[test]
fn test_sat_model_becomes_counterexample_states() {
    // Target writes, rewrite does not; the scripted model stands in for
    // the solver's witness to the differing final memories.
    let mut model = Model::default();
    model.insert("t_r0_0".to_string(), SmtValue::BitVec { value: 5, width: 64 });
    model.insert("t_rf0".to_string(), SmtValue::BitVec { value: 1, width: 64 });
    model.insert("r_rf0".to_string(), SmtValue::BitVec { value: 2, width: 64 });
    model.insert(
        "t_mem_alias0".to_string(),
        SmtValue::BitVec {
            value: 0x4000,
            width: 64,
        },
    );
    model.insert(
        "t_deref0_fin0".to_string(),
        SmtValue::BitVec {
            value: 0xDD,
            width: 8,
        },
    );

    let config = CheckerConfig {
        alias_strategy: AliasStrategy::Arm,
        ..CheckerConfig::default()
    };
    let mut checker = SmtObligationChecker::with_solver_factory(
        config,
        scripted_factory(SolverOutcome::Sat(model)),
    );
    let target = store_cfg(0xAABBCCDD, literal(0x4000));
    let rewrite = empty_cfg();
    let result = check(
        &mut checker,
        &target,
        &rewrite,
        Arc::new(TrueInvariant),
        Arc::new(RegisterEqInvariant::new(Reg(0), Reg(0))),
        &[],
    );
    assert!(result.has_ceg, "got {result}");
    let target_start = result.target_ceg.as_ref().unwrap();
    assert_eq!(target_start.regs[0], 5);
    let target_final = result.target_final_ceg.as_ref().unwrap();
    assert_eq!(target_final.regs[0], 1);
    assert_eq!(target_final.memory.get(&0x4000), Some(&0xDD));
    assert_eq!(result.rewrite_final_ceg.as_ref().unwrap().regs[0], 2);
}

#[test]
fn test_testcase_refutes_without_solver_round_trip() {
    // An exhausted script errors if consulted, so passing proves the
    // shortcut fired.
    let mut checker =
        SmtObligationChecker::with_solver_factory(CheckerConfig::default(), exhausted_factory());
    let cfg = empty_cfg();
    let mut target_state = CpuState::default();
    target_state.regs[0] = 1;
    let result = check(
        &mut checker,
        &cfg,
        &cfg,
        Arc::new(TrueInvariant),
        Arc::new(RegisterEqInvariant::new(Reg(0), Reg(0))),
        &[(target_state.clone(), CpuState::default())],
    );
    assert!(result.has_ceg, "got {result}");
    assert_eq!(result.target_ceg.as_ref().unwrap().regs[0], 1);
}

#[test]
fn test_filter_rejection_surfaces_as_error() {
    let mut checker = SmtObligationChecker::with_solver_factory(
        CheckerConfig::default(),
        scripted_factory(SolverOutcome::Unsat),
    )
    .with_filter(Box::new(PathLengthFilter { max_len: 0 }));
    let cfg = empty_cfg();
    let result = check(
        &mut checker,
        &cfg,
        &cfg,
        Arc::new(TrueInvariant),
        Arc::new(TrueInvariant),
        &[],
    );
    assert!(result.has_error, "got {result}");
    assert!(result
        .error_message
        .as_deref()
        .unwrap_or("")
        .starts_with("rejected:"));
}

#[test]
fn test_solver_unknown_surfaces_as_error() {
    let mut checker = SmtObligationChecker::with_solver_factory(
        CheckerConfig::default(),
        scripted_factory(SolverOutcome::Unknown("out of gas".to_string())),
    );
    let cfg = empty_cfg();
    let result = check(
        &mut checker,
        &cfg,
        &cfg,
        Arc::new(TrueInvariant),
        Arc::new(TrueInvariant),
        &[],
    );
    assert!(result.has_error);
    assert!(result
        .error_message
        .as_deref()
        .unwrap_or("")
        .contains("out of gas"));
}

#[test]
fn test_cell_search_bound_surfaces_as_error() {
    let config = CheckerConfig {
        alias_strategy: AliasStrategy::Arm,
        max_alias_cases: 1,
        ..CheckerConfig::default()
    };
    let mut checker = SmtObligationChecker::with_solver_factory(config, exhausted_factory());
    // Unrelated base registers make the aliasing ambiguous, forcing the
    // search past a bound of one explored state.
    let with_base = |reg| MemRef {
        base: Some(reg),
        disp: 0,
    };
    let target = store_cfg(1, with_base(Reg(1)));
    let rewrite = store_cfg(1, with_base(Reg(2)));
    let result = check(
        &mut checker,
        &target,
        &rewrite,
        Arc::new(TrueInvariant),
        Arc::new(TrueInvariant),
        &[],
    );
    assert!(result.has_error, "got {result}");
}

struct SleepSolver {
    delay: Duration,
}

impl Solver for SleepSolver {
    fn check_sat(&mut self, _assertions: &[SymBool]) -> SolverResult<SolverOutcome> {
        std::thread::sleep(self.delay);
        Ok(SolverOutcome::Unknown("gave up slowly".to_string()))
    }

    fn name(&self) -> &str {
        "sleep"
    }
}

#[test]
fn test_race_takes_fast_winner_and_discards_slow_loser() {
    use bequiv_sym::StrategyKind;

    let factory: SolverFactory = Arc::new(|kind| -> Box<dyn Solver> {
        match kind {
            StrategyKind::Arm => Box::new(ScriptedSolver::new([SolverOutcome::Unsat])),
            _ => Box::new(SleepSolver {
                delay: Duration::from_millis(300),
            }),
        }
    });
    let config = CheckerConfig {
        alias_strategy: AliasStrategy::ArmsRace,
        ..CheckerConfig::default()
    };
    let mut checker = SmtObligationChecker::with_solver_factory(config, factory);
    let cfg = store_cfg(7, literal(0x100));
    let result = check(
        &mut checker,
        &cfg,
        &cfg,
        Arc::new(TrueInvariant),
        Arc::new(TrueInvariant),
        &[],
    );
    assert!(result.verified, "got {result}");
    assert!(!result.has_error);
}

#[test]
fn test_race_verdict_does_not_wait_for_slow_first_entrant() {
    use bequiv_sym::StrategyKind;
    use std::time::Instant;

    // The cell-based entrant starts first but stalls; the flat entrant
    // answers immediately and must win without waiting out the stall.
    let factory: SolverFactory = Arc::new(|kind| -> Box<dyn Solver> {
        match kind {
            StrategyKind::Arm => Box::new(SleepSolver {
                delay: Duration::from_millis(1000),
            }),
            _ => Box::new(ScriptedSolver::new([SolverOutcome::Unsat])),
        }
    });
    let config = CheckerConfig {
        alias_strategy: AliasStrategy::ArmsRace,
        ..CheckerConfig::default()
    };
    let mut checker = SmtObligationChecker::with_solver_factory(config, factory);
    let cfg = store_cfg(7, literal(0x100));
    let started = Instant::now();
    let result = check(
        &mut checker,
        &cfg,
        &cfg,
        Arc::new(TrueInvariant),
        Arc::new(TrueInvariant),
        &[],
    );
    assert!(result.verified, "got {result}");
    assert!(
        started.elapsed() < Duration::from_millis(700),
        "verdict waited for the stalled entrant"
    );
}
