//! Z3 subprocess backend.
//!
//! Runs `z3 -in -smt2` per query, feeding the rendered script on stdin.
//! The solver's own `-T` soft timeout turns long queries into `unknown`
//! instead of leaving the process hanging.

use std::io::Write as _;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use bequiv_sym::SymBool;
use tracing::{debug, warn};

use crate::error::{SolverError, SolverResult};
use crate::outcome::{Model, SmtValue, SolverOutcome};
use crate::smtlib::to_smt2;
use crate::solver::Solver;

#[derive(Debug, Clone)]
pub struct Z3Solver {
    binary: String,
    timeout: Duration,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            binary: "z3".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary: path.into(),
            ..Self::new()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver for Z3Solver {
    fn check_sat(&mut self, assertions: &[SymBool]) -> SolverResult<SolverOutcome> {
        let script = to_smt2(assertions)?;
        debug!(
            assertions = assertions.len(),
            bytes = script.len(),
            "invoking z3"
        );

        let started = Instant::now();
        let mut child = Command::new(&self.binary)
            .arg("-in")
            .arg("-smt2")
            .arg(format!("-T:{}", self.timeout.as_secs().max(1)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(stdin) = child.stdin.take() {
            let mut stdin = stdin;
            stdin.write_all(script.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(elapsed = ?started.elapsed(), "z3 finished");

        parse_output(&stdout, &stderr)
    }

    fn name(&self) -> &str {
        "z3"
    }
}

fn parse_output(stdout: &str, stderr: &str) -> SolverResult<SolverOutcome> {
    let mut lines = stdout.lines();
    match lines.next().map(str::trim) {
        Some("unsat") => Ok(SolverOutcome::Unsat),
        Some("sat") => {
            let rest: String = lines.collect::<Vec<_>>().join("\n");
            Ok(SolverOutcome::Sat(parse_model(&rest)))
        }
        Some("unknown") | Some("timeout") => {
            Ok(SolverOutcome::Unknown("solver returned unknown".to_string()))
        }
        _ => Err(SolverError::Parse(format!(
            "no verdict in solver output; stdout: {stdout:?}, stderr: {stderr:?}"
        ))),
    }
}

/// Extract `(define-fun name () sort value)` entries from a model dump.
/// Entries we cannot interpret (array values, functions) are skipped.
fn parse_model(text: &str) -> Model {
    let mut model = Model::default();
    let mut rest = text;
    while let Some(pos) = rest.find("(define-fun ") {
        let entry = match balanced(&rest[pos..]) {
            Some(e) => e,
            None => break,
        };
        if let Some((name, value)) = parse_define_fun(entry) {
            model.insert(name, value);
        }
        rest = &rest[pos + entry.len()..];
    }
    model
}

/// The balanced-paren prefix of `s`, which must start with '('.
fn balanced(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_define_fun(entry: &str) -> Option<(String, SmtValue)> {
    // Shape: (define-fun NAME () SORT VALUE)
    let body = entry
        .strip_prefix('(')?
        .strip_suffix(')')?
        .strip_prefix("define-fun")?
        .trim_start();
    let (name, after_name) = body.split_once(char::is_whitespace)?;
    let after_args = after_name.trim_start().strip_prefix("()")?.trim_start();
    let value_text = after_args
        .strip_prefix("Bool")
        .or_else(|| {
            let sort = balanced(after_args)?;
            Some(&after_args[sort.len()..])
        })?
        .trim();

    let value = parse_value(value_text);
    if value.is_none() {
        warn!(name, text = value_text, "skipping unparseable model entry");
    }
    Some((name.to_string(), value?))
}

fn parse_value(text: &str) -> Option<SmtValue> {
    let text = text.trim();
    if text == "true" {
        return Some(SmtValue::Bool(true));
    }
    if text == "false" {
        return Some(SmtValue::Bool(false));
    }
    if let Some(hex) = text.strip_prefix("#x") {
        let value = u64::from_str_radix(hex, 16).ok()?;
        return Some(SmtValue::BitVec {
            value,
            width: 4 * hex.len() as u32,
        });
    }
    if let Some(bits) = text.strip_prefix("#b") {
        let value = u64::from_str_radix(bits, 2).ok()?;
        return Some(SmtValue::BitVec {
            value,
            width: bits.len() as u32,
        });
    }
    if let Some(inner) = text.strip_prefix("(_ bv") {
        let inner = inner.strip_suffix(')')?;
        let (value, width) = inner.split_once(char::is_whitespace)?;
        return Some(SmtValue::BitVec {
            value: value.trim().parse().ok()?,
            width: width.trim().parse().ok()?,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsat_verdict() {
        assert_eq!(parse_output("unsat\n", "").unwrap(), SolverOutcome::Unsat);
    }

    #[test]
    fn test_unknown_verdict() {
        assert!(matches!(
            parse_output("unknown\n", "").unwrap(),
            SolverOutcome::Unknown(_)
        ));
    }

    #[test]
    fn test_garbage_output_is_an_error() {
        assert!(matches!(
            parse_output("error \"unexpected token\"\n", ""),
            Err(SolverError::Parse(_))
        ));
    }

    #[test]
    fn test_sat_with_model() {
        let stdout = "sat\n(\n  (define-fun x () (_ BitVec 32) #x0000002a)\n  \
                      (define-fun flag () Bool true)\n  \
                      (define-fun n () (_ BitVec 8) (_ bv5 8))\n)\n";
        let outcome = parse_output(stdout, "").unwrap();
        let model = match outcome {
            SolverOutcome::Sat(m) => m,
            other => panic!("expected sat, got {other:?}"),
        };
        assert_eq!(
            model.get("x"),
            Some(&SmtValue::BitVec {
                value: 0x2a,
                width: 32
            })
        );
        assert_eq!(model.get("flag"), Some(&SmtValue::Bool(true)));
        assert_eq!(model.get("n"), Some(&SmtValue::BitVec { value: 5, width: 8 }));
    }

    #[test]
    fn test_binary_literal_values() {
        assert_eq!(
            parse_value("#b1010"),
            Some(SmtValue::BitVec {
                value: 0b1010,
                width: 4
            })
        );
    }

    #[test]
    fn test_array_model_entries_are_skipped() {
        let stdout = "sat\n(\n  (define-fun mem () (Array (_ BitVec 64) (_ BitVec 8)) \
                      ((as const (Array (_ BitVec 64) (_ BitVec 8))) #x00))\n  \
                      (define-fun x () (_ BitVec 8) #xff)\n)\n";
        let outcome = parse_output(stdout, "").unwrap();
        match outcome {
            SolverOutcome::Sat(model) => {
                assert!(!model.contains_key("mem"));
                assert_eq!(
                    model.get("x"),
                    Some(&SmtValue::BitVec {
                        value: 0xff,
                        width: 8
                    })
                );
            }
            other => panic!("expected sat, got {other:?}"),
        }
    }
}
