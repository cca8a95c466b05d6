//! SMT-LIB v2 script emission.
//!
//! Renders symbolic formulas into a self-contained `QF_ABV` script:
//! sorted declarations for every free variable, one assert per formula,
//! then `(check-sat)` and `(get-model)`. Declarations are emitted in name
//! order so scripts are reproducible across runs.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use bequiv_sym::{SymArray, SymBool, SymBv};

use crate::error::{SolverError, SolverResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sort {
    Bool,
    BitVec(u32),
    ByteArray,
}

impl Sort {
    fn smt2(&self) -> String {
        match self {
            Sort::Bool => "Bool".to_string(),
            Sort::BitVec(w) => format!("(_ BitVec {w})"),
            Sort::ByteArray => "(Array (_ BitVec 64) (_ BitVec 8))".to_string(),
        }
    }
}

type Declarations = BTreeMap<String, Sort>;

fn declare(decls: &mut Declarations, name: &str, sort: Sort) -> SolverResult<()> {
    match decls.get(name) {
        Some(existing) if *existing != sort => Err(SolverError::Encoding(format!(
            "variable {name} used at conflicting sorts"
        ))),
        Some(_) => Ok(()),
        None => {
            decls.insert(name.to_string(), sort);
            Ok(())
        }
    }
}

fn collect_bv(e: &SymBv, decls: &mut Declarations) -> SolverResult<()> {
    match e {
        SymBv::Const { .. } => Ok(()),
        SymBv::Var { name, width } => declare(decls, name, Sort::BitVec(*width)),
        SymBv::Bin { lhs, rhs, .. } => {
            collect_bv(lhs, decls)?;
            collect_bv(rhs, decls)
        }
        SymBv::Concat { hi, lo } => {
            collect_bv(hi, decls)?;
            collect_bv(lo, decls)
        }
        SymBv::Extract { arg, .. } => collect_bv(arg, decls),
        SymBv::Select { array, index } => {
            collect_array(array, decls)?;
            collect_bv(index, decls)
        }
        SymBv::Ite {
            cond,
            then_bv,
            else_bv,
        } => {
            collect_bool(cond, decls)?;
            collect_bv(then_bv, decls)?;
            collect_bv(else_bv, decls)
        }
    }
}

fn collect_bool(e: &SymBool, decls: &mut Declarations) -> SolverResult<()> {
    match e {
        SymBool::Const(_) => Ok(()),
        SymBool::Var(name) => declare(decls, name, Sort::Bool),
        SymBool::Not(a) => collect_bool(a, decls),
        SymBool::And(a, b) | SymBool::Or(a, b) | SymBool::Implies(a, b) => {
            collect_bool(a, decls)?;
            collect_bool(b, decls)
        }
        SymBool::Eq(a, b) | SymBool::Ult(a, b) | SymBool::Ule(a, b) => {
            collect_bv(a, decls)?;
            collect_bv(b, decls)
        }
        SymBool::ArrayEq(a, b) => {
            collect_array(a, decls)?;
            collect_array(b, decls)
        }
    }
}

fn collect_array(e: &SymArray, decls: &mut Declarations) -> SolverResult<()> {
    match e {
        SymArray::Var { name } => declare(decls, name, Sort::ByteArray),
        SymArray::Store {
            array,
            index,
            value,
        } => {
            collect_array(array, decls)?;
            collect_bv(index, decls)?;
            collect_bv(value, decls)
        }
    }
}

fn fmt_bv(e: &SymBv, out: &mut String) {
    match e {
        SymBv::Const { value, width } => {
            let _ = write!(out, "(_ bv{value} {width})");
        }
        SymBv::Var { name, .. } => out.push_str(name),
        SymBv::Bin { op, lhs, rhs } => {
            let _ = write!(out, "({} ", op.smt_name());
            fmt_bv(lhs, out);
            out.push(' ');
            fmt_bv(rhs, out);
            out.push(')');
        }
        SymBv::Concat { hi, lo } => {
            out.push_str("(concat ");
            fmt_bv(hi, out);
            out.push(' ');
            fmt_bv(lo, out);
            out.push(')');
        }
        SymBv::Extract { hi, lo, arg } => {
            let _ = write!(out, "((_ extract {hi} {lo}) ");
            fmt_bv(arg, out);
            out.push(')');
        }
        SymBv::Select { array, index } => {
            out.push_str("(select ");
            fmt_array(array, out);
            out.push(' ');
            fmt_bv(index, out);
            out.push(')');
        }
        SymBv::Ite {
            cond,
            then_bv,
            else_bv,
        } => {
            out.push_str("(ite ");
            fmt_bool(cond, out);
            out.push(' ');
            fmt_bv(then_bv, out);
            out.push(' ');
            fmt_bv(else_bv, out);
            out.push(')');
        }
    }
}

fn fmt_bool(e: &SymBool, out: &mut String) {
    match e {
        SymBool::Const(b) => {
            let _ = write!(out, "{b}");
        }
        SymBool::Var(name) => out.push_str(name),
        SymBool::Not(a) => {
            out.push_str("(not ");
            fmt_bool(a, out);
            out.push(')');
        }
        SymBool::And(a, b) | SymBool::Or(a, b) | SymBool::Implies(a, b) => {
            let op = match e {
                SymBool::And(_, _) => "and",
                SymBool::Or(_, _) => "or",
                _ => "=>",
            };
            let _ = write!(out, "({op} ");
            fmt_bool(a, out);
            out.push(' ');
            fmt_bool(b, out);
            out.push(')');
        }
        SymBool::Eq(a, b) | SymBool::Ult(a, b) | SymBool::Ule(a, b) => {
            let op = match e {
                SymBool::Eq(_, _) => "=",
                SymBool::Ult(_, _) => "bvult",
                _ => "bvule",
            };
            let _ = write!(out, "({op} ");
            fmt_bv(a, out);
            out.push(' ');
            fmt_bv(b, out);
            out.push(')');
        }
        SymBool::ArrayEq(a, b) => {
            out.push_str("(= ");
            fmt_array(a, out);
            out.push(' ');
            fmt_array(b, out);
            out.push(')');
        }
    }
}

fn fmt_array(e: &SymArray, out: &mut String) {
    match e {
        SymArray::Var { name } => out.push_str(name),
        SymArray::Store {
            array,
            index,
            value,
        } => {
            out.push_str("(store ");
            fmt_array(array, out);
            out.push(' ');
            fmt_bv(index, out);
            out.push(' ');
            fmt_bv(value, out);
            out.push(')');
        }
    }
}

/// Render a complete check-sat script for the given assertions.
pub fn to_smt2(assertions: &[SymBool]) -> SolverResult<String> {
    let mut decls = Declarations::new();
    for assertion in assertions {
        collect_bool(assertion, &mut decls)?;
    }

    let mut script = String::from("(set-logic QF_ABV)\n");
    for (name, sort) in &decls {
        let _ = writeln!(script, "(declare-const {name} {})", sort.smt2());
    }
    for assertion in assertions {
        script.push_str("(assert ");
        fmt_bool(assertion, &mut script);
        script.push_str(")\n");
    }
    script.push_str("(check-sat)\n(get-model)\n");
    Ok(script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declarations_are_sorted_and_typed() {
        let x = SymBv::var("x", 32);
        let a = SymArray::var("arr");
        let formula = SymBool::and(
            x.equals(&SymBv::constant(7, 32)),
            a.select(SymBv::var("addr", 64)).equals(&SymBv::constant(0, 8)),
        );
        let script = to_smt2(&[formula]).unwrap();
        let addr_pos = script.find("(declare-const addr (_ BitVec 64))").unwrap();
        let arr_pos = script
            .find("(declare-const arr (Array (_ BitVec 64) (_ BitVec 8)))")
            .unwrap();
        let x_pos = script.find("(declare-const x (_ BitVec 32))").unwrap();
        assert!(addr_pos < arr_pos && arr_pos < x_pos);
        assert!(script.contains("(_ bv7 32)"));
        assert!(script.ends_with("(check-sat)\n(get-model)\n"));
    }

    #[test]
    fn test_extract_and_concat_syntax() {
        let x = SymBv::var("x", 16);
        let byte = x.clone().extract(15, 8);
        let formula = SymBv::concat(byte, SymBv::constant(1, 8))
            .equals(&SymBv::var("y", 16));
        let mut out = String::new();
        fmt_bool(&formula, &mut out);
        assert_eq!(out, "(= (concat ((_ extract 15 8) x) (_ bv1 8)) y)");
    }

    #[test]
    fn test_conflicting_sorts_rejected() {
        let clash = SymBool::and(
            SymBv::var("v", 32).equals(&SymBv::constant(0, 32)),
            SymBv::var("v", 64).equals(&SymBv::constant(0, 64)),
        );
        assert!(matches!(
            to_smt2(&[clash]),
            Err(SolverError::Encoding(_))
        ));
    }

    #[test]
    fn test_empty_assertion_list_is_a_valid_script() {
        let script = to_smt2(&[]).unwrap();
        assert!(script.starts_with("(set-logic QF_ABV)"));
        assert!(script.contains("(check-sat)"));
    }
}
