//! Naive enumeration memory model.
//!
//! Reads are resolved by walking every earlier write with a per-byte ite
//! chain over address equalities, so the solver never sees an array store
//! for aliasing purposes; only the initial memory is consulted through the
//! start array. Sound for arbitrary overlap patterns, but the formulas grow
//! with the square of the access count, hence the configured bound.

use crate::error::{MemoryError, MemoryResult};
use crate::expr::{SymArray, SymBool, SymBv};
use crate::memory::{AccessLog, MemAccess, MemConfig, SymbolicMemory};

#[derive(Debug)]
pub struct BasicMemory {
    log: AccessLog,
    start: SymArray,
    end: SymArray,
    finalized: bool,
    max_accesses: usize,
    eq_cache: Option<SymBool>,
}

impl BasicMemory {
    pub fn new(config: MemConfig, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let start = SymArray::var(format!("{prefix}_start"));
        let end = SymArray::var(format!("{prefix}_end"));
        Self {
            log: AccessLog::new(prefix),
            start,
            end,
            finalized: false,
            max_accesses: config.max_accesses,
            eq_cache: None,
        }
    }

    /// Value of the byte at `addr` after the first `upto` recorded accesses.
    ///
    /// Later writes appear as the outermost ite, so program order decides
    /// which write a read observes.
    fn byte_at(&self, addr: &SymBv, upto: usize) -> SymBv {
        let mut value = self.start.select(addr.clone());
        for access in self.log.accesses.iter().take(upto).filter(|a| a.write) {
            let bytes = access.value.to_le_bytes();
            for (j, byte) in bytes.into_iter().enumerate() {
                let hits = addr.equals(&access.address.offset(j as i64));
                value = SymBv::ite(hits, byte, value);
            }
        }
        value
    }

    /// Every distinct byte address touched by a recorded access, in first
    /// touch order.
    fn touched_bytes(&self) -> Vec<SymBv> {
        let mut out: Vec<SymBv> = Vec::new();
        for access in &self.log.accesses {
            for i in 0..access.size {
                let addr = access.address.offset(i as i64);
                if !out.contains(&addr) {
                    out.push(addr);
                }
            }
        }
        out
    }

    /// Per-address equality of the two instances' final byte values.
    pub fn equality_constraint(&mut self, other: &mut BasicMemory) -> MemoryResult<SymBool> {
        if !self.finalized || !other.finalized {
            return Err(MemoryError::NotFinalized);
        }
        if let Some(eq) = &self.eq_cache {
            return Ok(eq.clone());
        }
        if self.log.accesses.len() > self.max_accesses
            || other.log.accesses.len() > other.max_accesses
        {
            return Err(MemoryError::AccessBound {
                limit: self.max_accesses,
            });
        }

        let mut touched = self.touched_bytes();
        for addr in other.touched_bytes() {
            if !touched.contains(&addr) {
                touched.push(addr);
            }
        }

        let eq = SymBool::conjoin(touched.into_iter().map(|addr| {
            let mine = self.byte_at(&addr, self.log.accesses.len());
            let theirs = other.byte_at(&addr, other.log.accesses.len());
            mine.equals(&theirs)
        }));
        self.eq_cache = Some(eq.clone());
        Ok(eq)
    }
}

impl SymbolicMemory for BasicMemory {
    fn write(&mut self, address: SymBv, value: SymBv, size: u32) -> SymBool {
        self.log.record_write(address, value, size);
        SymBool::fals()
    }

    fn read(&mut self, address: SymBv, size: u32) -> (SymBv, SymBool) {
        let upto = self.log.accesses.len();
        let placeholder = self.log.record_read(address.clone(), size);
        let bytes: Vec<SymBv> = (0..size)
            .map(|i| self.byte_at(&address.offset(i as i64), upto))
            .collect();
        self.log
            .constraints
            .push(placeholder.equals(&SymBv::from_le_bytes(&bytes)));
        (placeholder, SymBool::fals())
    }

    fn start_variable(&self) -> SymArray {
        self.start.clone()
    }

    fn end_variable(&self) -> SymArray {
        self.end.clone()
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        // Pin the end array to the start array overwritten with the final
        // value of every touched byte, so counterexample extraction can
        // dereference the post state.
        let mut end_expr = self.start.clone();
        let total = self.log.accesses.len();
        for addr in self.touched_bytes() {
            let byte = self.byte_at(&addr, total);
            end_expr = end_expr.store(addr, byte);
        }
        self.log.constraints.push(self.end.equals(&end_expr));
        self.finalized = true;
    }

    fn generated_constraints(&self) -> Vec<SymBool> {
        self.log.constraints.clone()
    }

    fn access_list(&self) -> &[(SymBv, u32)] {
        &self.log.access_list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(prefix: &str) -> BasicMemory {
        BasicMemory::new(MemConfig::default(), prefix)
    }

    #[test]
    fn test_read_sees_latest_write_via_ite_chain() {
        let mut m = mem("t_mem");
        let addr = SymBv::var("p", 64);
        m.write(addr.clone(), SymBv::constant(1, 8), 1);
        m.write(addr.clone(), SymBv::constant(2, 8), 1);
        let (_, _) = m.read(addr, 1);
        let binding = m.generated_constraints().pop().unwrap();
        let text = binding.to_string();
        // Both writes appear; the second is the outermost ite.
        assert!(text.contains("ite"));
        assert!(text.contains("2:8"));
        assert!(text.contains("1:8"));
    }

    #[test]
    fn test_equality_covers_union_of_touched_addresses() {
        let mut a = mem("t_mem");
        let mut b = mem("r_mem");
        a.write(SymBv::constant(0x10, 64), SymBv::constant(7, 8), 1);
        b.write(SymBv::constant(0x20, 64), SymBv::constant(9, 8), 1);
        a.finalize();
        b.finalize();
        let eq = a.equality_constraint(&mut b).unwrap();
        let text = eq.to_string();
        assert!(text.contains("16:64"), "missing target address: {text}");
        assert!(text.contains("32:64"), "missing rewrite address: {text}");
    }

    #[test]
    fn test_equality_is_cached() {
        let mut a = mem("t_mem");
        let mut b = mem("r_mem");
        a.write(SymBv::constant(0x10, 64), SymBv::constant(7, 8), 1);
        a.finalize();
        b.finalize();
        let eq1 = a.equality_constraint(&mut b).unwrap();
        let eq2 = a.equality_constraint(&mut b).unwrap();
        assert_eq!(eq1, eq2);
    }

    #[test]
    fn test_access_bound_enforced() {
        let mut a = BasicMemory::new(
            MemConfig {
                max_accesses: 2,
                ..MemConfig::default()
            },
            "t_mem",
        );
        let mut b = mem("r_mem");
        for i in 0..3 {
            a.write(SymBv::constant(i * 8, 64), SymBv::constant(0, 8), 1);
        }
        a.finalize();
        b.finalize();
        assert_eq!(
            a.equality_constraint(&mut b),
            Err(MemoryError::AccessBound { limit: 2 })
        );
    }
}
