//! The blocking adapter must work whether a checker delivers its result
//! inline or later from another thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bequiv_cfg::{Block, BlockId, Cfg, CfgBuilder, CfgPath};
use bequiv_validator::{
    Callback, CheckResult, CpuState, DefaultFilter, Filter, Invariant, ObligationChecker,
    TrueInvariant,
};

struct InlineChecker {
    filter: DefaultFilter,
}

impl ObligationChecker for InlineChecker {
    fn check(
        &mut self,
        _target: &Cfg,
        _rewrite: &Cfg,
        _target_block: BlockId,
        _rewrite_block: BlockId,
        _target_path: &CfgPath,
        _rewrite_path: &CfgPath,
        _assume: &Arc<dyn Invariant>,
        _prove: &Arc<dyn Invariant>,
        _testcases: &[(CpuState, CpuState)],
        callback: Callback,
        token: u64,
    ) {
        callback(CheckResult::verified(Duration::ZERO), token);
    }

    fn filter(&self) -> &dyn Filter {
        &self.filter
    }
}

struct DeferredChecker {
    filter: DefaultFilter,
    delay: Duration,
}

impl ObligationChecker for DeferredChecker {
    fn check(
        &mut self,
        _target: &Cfg,
        _rewrite: &Cfg,
        _target_block: BlockId,
        _rewrite_block: BlockId,
        _target_path: &CfgPath,
        _rewrite_path: &CfgPath,
        _assume: &Arc<dyn Invariant>,
        _prove: &Arc<dyn Invariant>,
        _testcases: &[(CpuState, CpuState)],
        callback: Callback,
        token: u64,
    ) {
        let delay = self.delay;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            callback(CheckResult::error("deferred failure", Duration::ZERO), token);
        });
    }

    fn filter(&self) -> &dyn Filter {
        &self.filter
    }
}

fn trivial_cfg() -> Cfg {
    CfgBuilder::new()
        .block(Block {
            id: 0,
            instrs: Vec::new(),
            cond: None,
        })
        .build()
        .unwrap()
}

fn wait(checker: &mut dyn ObligationChecker, token: u64) -> CheckResult {
    let cfg = trivial_cfg();
    let path = vec![0];
    let invariant: Arc<dyn Invariant> = Arc::new(TrueInvariant);
    checker.check_wait(
        &cfg, &cfg, 0, 0, &path, &path, &invariant, &invariant, &[], token,
    )
}

#[test]
fn test_check_wait_with_inline_delivery() {
    let mut checker = InlineChecker {
        filter: DefaultFilter,
    };
    let result = wait(&mut checker, 1);
    assert!(result.verified);
}

#[test]
fn test_check_wait_with_deferred_delivery() {
    let mut checker = DeferredChecker {
        filter: DefaultFilter,
        delay: Duration::from_millis(50),
    };
    let result = wait(&mut checker, 2);
    assert!(result.has_error);
    assert_eq!(result.error_message.as_deref(), Some("deferred failure"));
}

#[test]
fn test_callback_receives_the_token() {
    let mut checker = InlineChecker {
        filter: DefaultFilter,
    };
    let cfg = trivial_cfg();
    let path = vec![0];
    let invariant: Arc<dyn Invariant> = Arc::new(TrueInvariant);
    let seen = Arc::new(AtomicU64::new(0));
    let seen_in_callback = Arc::clone(&seen);
    checker.check(
        &cfg,
        &cfg,
        0,
        0,
        &path,
        &path,
        &invariant,
        &invariant,
        &[],
        Box::new(move |_result, token| {
            seen_in_callback.store(token, Ordering::SeqCst);
        }),
        0xBEEF,
    );
    assert_eq!(seen.load(Ordering::SeqCst), 0xBEEF);
}
