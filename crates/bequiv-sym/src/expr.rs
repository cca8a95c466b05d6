//! Symbolic bit-vector, boolean, and array expressions.
//!
//! Expressions are immutable `Arc`-linked DAGs built through smart
//! constructors. A handful of constructors fold constants (double negation,
//! conjunction with a literal) so the formulas handed to the solver stay
//! readable; everything else is kept structural so two syntactically equal
//! expressions compare equal.

// These constructors build AST nodes, not perform operations.
// Implementing std::ops traits would be semantically incorrect.
#![allow(clippy::should_implement_trait)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_temp_id() -> u64 {
    TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Binary bit-vector operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BvOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
}

impl BvOp {
    /// SMT-LIB operator name.
    pub fn smt_name(self) -> &'static str {
        match self {
            BvOp::Add => "bvadd",
            BvOp::Sub => "bvsub",
            BvOp::And => "bvand",
            BvOp::Or => "bvor",
            BvOp::Xor => "bvxor",
        }
    }
}

/// A symbolic bit-vector expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymBv {
    /// Literal value, masked to `width` bits.
    Const { value: u64, width: u32 },
    /// Free variable.
    Var { name: String, width: u32 },
    /// Binary operation; both operands share one width.
    Bin {
        op: BvOp,
        lhs: Arc<SymBv>,
        rhs: Arc<SymBv>,
    },
    /// Concatenation; `hi` occupies the most significant bits.
    Concat { hi: Arc<SymBv>, lo: Arc<SymBv> },
    /// Bit extraction, inclusive bounds, `hi >= lo`.
    Extract {
        hi: u32,
        lo: u32,
        arg: Arc<SymBv>,
    },
    /// 8-bit read of a symbolic array at a 64-bit index.
    Select {
        array: Arc<SymArray>,
        index: Arc<SymBv>,
    },
    /// Conditional.
    Ite {
        cond: Arc<SymBool>,
        then_bv: Arc<SymBv>,
        else_bv: Arc<SymBv>,
    },
}

impl SymBv {
    pub fn constant(value: u64, width: u32) -> Self {
        let masked = if width >= 64 {
            value
        } else {
            value & ((1u64 << width) - 1)
        };
        SymBv::Const {
            value: masked,
            width,
        }
    }

    pub fn var(name: impl Into<String>, width: u32) -> Self {
        SymBv::Var {
            name: name.into(),
            width,
        }
    }

    /// Fresh variable from the process-wide temporary counter.
    pub fn temp(width: u32) -> Self {
        SymBv::var(format!("tmp_{}", next_temp_id()), width)
    }

    /// Name of the variable, if this expression is one.
    pub fn var_name(&self) -> Option<&str> {
        match self {
            SymBv::Var { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Width of the expression in bits.
    pub fn width(&self) -> u32 {
        match self {
            SymBv::Const { width, .. } | SymBv::Var { width, .. } => *width,
            SymBv::Bin { lhs, .. } => lhs.width(),
            SymBv::Concat { hi, lo } => hi.width() + lo.width(),
            SymBv::Extract { hi, lo, .. } => hi - lo + 1,
            SymBv::Select { .. } => 8,
            SymBv::Ite { then_bv, .. } => then_bv.width(),
        }
    }

    fn bin(op: BvOp, lhs: SymBv, rhs: SymBv) -> Self {
        debug_assert_eq!(lhs.width(), rhs.width());
        SymBv::Bin {
            op,
            lhs: Arc::new(lhs),
            rhs: Arc::new(rhs),
        }
    }

    pub fn add(lhs: SymBv, rhs: SymBv) -> Self {
        if let (SymBv::Const { value: a, width }, SymBv::Const { value: b, .. }) = (&lhs, &rhs) {
            return SymBv::constant(a.wrapping_add(*b), *width);
        }
        // x + 0 = x
        if matches!(rhs, SymBv::Const { value: 0, .. }) {
            return lhs;
        }
        SymBv::bin(BvOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: SymBv, rhs: SymBv) -> Self {
        if matches!(rhs, SymBv::Const { value: 0, .. }) {
            return lhs;
        }
        SymBv::bin(BvOp::Sub, lhs, rhs)
    }

    pub fn and(lhs: SymBv, rhs: SymBv) -> Self {
        SymBv::bin(BvOp::And, lhs, rhs)
    }

    pub fn or(lhs: SymBv, rhs: SymBv) -> Self {
        SymBv::bin(BvOp::Or, lhs, rhs)
    }

    pub fn xor(lhs: SymBv, rhs: SymBv) -> Self {
        SymBv::bin(BvOp::Xor, lhs, rhs)
    }

    pub fn concat(hi: SymBv, lo: SymBv) -> Self {
        SymBv::Concat {
            hi: Arc::new(hi),
            lo: Arc::new(lo),
        }
    }

    pub fn extract(self, hi: u32, lo: u32) -> Self {
        debug_assert!(hi >= lo && hi < self.width());
        if lo == 0 && hi + 1 == self.width() {
            return self;
        }
        SymBv::Extract {
            hi,
            lo,
            arg: Arc::new(self),
        }
    }

    pub fn ite(cond: SymBool, then_bv: SymBv, else_bv: SymBv) -> Self {
        debug_assert_eq!(then_bv.width(), else_bv.width());
        match cond {
            SymBool::Const(true) => then_bv,
            SymBool::Const(false) => else_bv,
            cond => SymBv::Ite {
                cond: Arc::new(cond),
                then_bv: Arc::new(then_bv),
                else_bv: Arc::new(else_bv),
            },
        }
    }

    /// Zero-extend to `width` bits.
    pub fn zero_extend(self, width: u32) -> Self {
        let w = self.width();
        debug_assert!(width >= w);
        if width == w {
            self
        } else {
            SymBv::concat(SymBv::constant(0, width - w), self)
        }
    }

    /// Split into little-endian bytes. Width must be a multiple of 8.
    pub fn to_le_bytes(&self) -> Vec<SymBv> {
        let w = self.width();
        debug_assert_eq!(w % 8, 0);
        (0..w / 8)
            .map(|i| self.clone().extract(8 * i + 7, 8 * i))
            .collect()
    }

    /// Reassemble a value from little-endian bytes. Contiguous extracts of
    /// a single value fold back to the value itself.
    pub fn from_le_bytes(bytes: &[SymBv]) -> Self {
        debug_assert!(!bytes.is_empty());
        if let Some(whole) = SymBv::refold_extracts(bytes) {
            return whole;
        }
        let mut acc = bytes[0].clone();
        for b in &bytes[1..] {
            acc = SymBv::concat(b.clone(), acc);
        }
        acc
    }

    fn refold_extracts(bytes: &[SymBv]) -> Option<SymBv> {
        let source = match &bytes[0] {
            SymBv::Extract { hi: 7, lo: 0, arg } => arg.clone(),
            _ => return None,
        };
        if source.width() != 8 * bytes.len() as u32 {
            return None;
        }
        for (i, byte) in bytes.iter().enumerate() {
            match byte {
                SymBv::Extract { hi, lo, arg }
                    if *lo == 8 * i as u32 && *hi == lo + 7 && *arg == source => {}
                _ => return None,
            }
        }
        Some((*source).clone())
    }

    pub fn equals(&self, other: &SymBv) -> SymBool {
        SymBool::Eq(Arc::new(self.clone()), Arc::new(other.clone()))
    }

    /// Unsigned less-than.
    pub fn ult(&self, other: &SymBv) -> SymBool {
        SymBool::Ult(Arc::new(self.clone()), Arc::new(other.clone()))
    }

    /// Unsigned less-or-equal.
    pub fn ule(&self, other: &SymBv) -> SymBool {
        SymBool::Ule(Arc::new(self.clone()), Arc::new(other.clone()))
    }

    /// Decompose an address into a symbolic base plus a literal byte
    /// displacement. A `None` base means the address is fully literal.
    ///
    /// This is the whole static-offset analysis the cell assignment relies
    /// on: two addresses have a known relative offset exactly when they
    /// decompose to the same base.
    pub fn linear_form(&self) -> (Option<SymBv>, i64) {
        match self {
            SymBv::Const { value, .. } => (None, *value as i64),
            SymBv::Bin { op: BvOp::Add, lhs, rhs } => {
                if let SymBv::Const { value, .. } = rhs.as_ref() {
                    let (base, disp) = lhs.linear_form();
                    return (base, disp.wrapping_add(*value as i64));
                }
                if let SymBv::Const { value, .. } = lhs.as_ref() {
                    let (base, disp) = rhs.linear_form();
                    return (base, disp.wrapping_add(*value as i64));
                }
                (Some(self.clone()), 0)
            }
            SymBv::Bin { op: BvOp::Sub, lhs, rhs } => {
                if let SymBv::Const { value, .. } = rhs.as_ref() {
                    let (base, disp) = lhs.linear_form();
                    return (base, disp.wrapping_sub(*value as i64));
                }
                (Some(self.clone()), 0)
            }
            other => (Some(other.clone()), 0),
        }
    }

    /// `self + disp`, with the displacement encoded two's-complement.
    pub fn offset(&self, disp: i64) -> SymBv {
        SymBv::add(self.clone(), SymBv::constant(disp as u64, self.width()))
    }
}

impl fmt::Display for SymBv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymBv::Const { value, width } => write!(f, "{value}:{width}"),
            SymBv::Var { name, .. } => write!(f, "{name}"),
            SymBv::Bin { op, lhs, rhs } => write!(f, "({} {lhs} {rhs})", op.smt_name()),
            SymBv::Concat { hi, lo } => write!(f, "(concat {hi} {lo})"),
            SymBv::Extract { hi, lo, arg } => write!(f, "({arg}[{hi}:{lo}])"),
            SymBv::Select { array, index } => write!(f, "(select {array} {index})"),
            SymBv::Ite { cond, then_bv, else_bv } => {
                write!(f, "(ite {cond} {then_bv} {else_bv})")
            }
        }
    }
}

/// A symbolic boolean expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymBool {
    Const(bool),
    Var(String),
    Not(Arc<SymBool>),
    And(Arc<SymBool>, Arc<SymBool>),
    Or(Arc<SymBool>, Arc<SymBool>),
    Implies(Arc<SymBool>, Arc<SymBool>),
    Eq(Arc<SymBv>, Arc<SymBv>),
    Ult(Arc<SymBv>, Arc<SymBv>),
    Ule(Arc<SymBv>, Arc<SymBv>),
    ArrayEq(Arc<SymArray>, Arc<SymArray>),
}

impl SymBool {
    pub fn tru() -> Self {
        SymBool::Const(true)
    }

    pub fn fals() -> Self {
        SymBool::Const(false)
    }

    pub fn var(name: impl Into<String>) -> Self {
        SymBool::Var(name.into())
    }

    pub fn not(e: SymBool) -> Self {
        match e {
            SymBool::Const(b) => SymBool::Const(!b),
            // Double negation elimination.
            SymBool::Not(inner) => (*inner).clone(),
            other => SymBool::Not(Arc::new(other)),
        }
    }

    pub fn and(a: SymBool, b: SymBool) -> Self {
        match (a, b) {
            (SymBool::Const(true), b) => b,
            (a, SymBool::Const(true)) => a,
            (SymBool::Const(false), _) | (_, SymBool::Const(false)) => SymBool::Const(false),
            (a, b) => SymBool::And(Arc::new(a), Arc::new(b)),
        }
    }

    pub fn or(a: SymBool, b: SymBool) -> Self {
        match (a, b) {
            (SymBool::Const(false), b) => b,
            (a, SymBool::Const(false)) => a,
            (SymBool::Const(true), _) | (_, SymBool::Const(true)) => SymBool::Const(true),
            (a, b) => SymBool::Or(Arc::new(a), Arc::new(b)),
        }
    }

    pub fn implies(a: SymBool, b: SymBool) -> Self {
        match (a, b) {
            (SymBool::Const(true), b) => b,
            (SymBool::Const(false), _) => SymBool::Const(true),
            (_, SymBool::Const(true)) => SymBool::Const(true),
            (a, b) => SymBool::Implies(Arc::new(a), Arc::new(b)),
        }
    }

    /// Conjunction of an iterator of formulas; `true` when empty.
    pub fn conjoin(parts: impl IntoIterator<Item = SymBool>) -> Self {
        parts
            .into_iter()
            .fold(SymBool::Const(true), SymBool::and)
    }

    /// Disjunction of an iterator of formulas; `false` when empty.
    pub fn disjoin(parts: impl IntoIterator<Item = SymBool>) -> Self {
        parts
            .into_iter()
            .fold(SymBool::Const(false), SymBool::or)
    }
}

impl fmt::Display for SymBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymBool::Const(b) => write!(f, "{b}"),
            SymBool::Var(name) => write!(f, "{name}"),
            SymBool::Not(e) => write!(f, "(not {e})"),
            SymBool::And(a, b) => write!(f, "(and {a} {b})"),
            SymBool::Or(a, b) => write!(f, "(or {a} {b})"),
            SymBool::Implies(a, b) => write!(f, "(=> {a} {b})"),
            SymBool::Eq(a, b) => write!(f, "(= {a} {b})"),
            SymBool::Ult(a, b) => write!(f, "(bvult {a} {b})"),
            SymBool::Ule(a, b) => write!(f, "(bvule {a} {b})"),
            SymBool::ArrayEq(a, b) => write!(f, "(= {a} {b})"),
        }
    }
}

/// A symbolic array of bytes indexed by 64-bit addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymArray {
    Var { name: String },
    Store {
        array: Arc<SymArray>,
        index: Arc<SymBv>,
        value: Arc<SymBv>,
    },
}

impl SymArray {
    pub fn var(name: impl Into<String>) -> Self {
        SymArray::Var { name: name.into() }
    }

    /// Fresh array variable from the process-wide temporary counter.
    pub fn temp() -> Self {
        SymArray::var(format!("arr_{}", next_temp_id()))
    }

    pub fn store(self, index: SymBv, value: SymBv) -> Self {
        debug_assert_eq!(index.width(), 64);
        debug_assert_eq!(value.width(), 8);
        SymArray::Store {
            array: Arc::new(self),
            index: Arc::new(index),
            value: Arc::new(value),
        }
    }

    pub fn select(&self, index: SymBv) -> SymBv {
        debug_assert_eq!(index.width(), 64);
        SymBv::Select {
            array: Arc::new(self.clone()),
            index: Arc::new(index),
        }
    }

    pub fn equals(&self, other: &SymArray) -> SymBool {
        SymBool::ArrayEq(Arc::new(self.clone()), Arc::new(other.clone()))
    }
}

impl fmt::Display for SymArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymArray::Var { name } => write!(f, "{name}"),
            SymArray::Store { array, index, value } => {
                write!(f, "(store {array} {index} {value})")
            }
        }
    }
}
