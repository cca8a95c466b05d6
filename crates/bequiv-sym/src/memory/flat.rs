//! Flat array memory model.
//!
//! Memory is one giant symbolic byte array; every access becomes an array
//! store or select and aliasing is left entirely to the solver's array
//! theory.

use crate::error::{MemoryError, MemoryResult};
use crate::expr::{SymArray, SymBool, SymBv};
use crate::memory::{AccessLog, SymbolicMemory};

#[derive(Debug)]
pub struct FlatMemory {
    log: AccessLog,
    start: SymArray,
    /// Running fold of stores, starting from `start`.
    heap: SymArray,
    end: SymArray,
    finalized: bool,
}

impl FlatMemory {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let start = SymArray::var(format!("{prefix}_start"));
        let end = SymArray::var(format!("{prefix}_end"));
        Self {
            log: AccessLog::new(prefix),
            heap: start.clone(),
            start,
            end,
            finalized: false,
        }
    }

    /// End-state equality with another flat instance.
    pub fn equality_constraint(&mut self, other: &mut FlatMemory) -> MemoryResult<SymBool> {
        if !self.finalized || !other.finalized {
            return Err(MemoryError::NotFinalized);
        }
        Ok(self.end.equals(&other.end))
    }
}

impl SymbolicMemory for FlatMemory {
    fn write(&mut self, address: SymBv, value: SymBv, size: u32) -> SymBool {
        self.log.record_write(address.clone(), value.clone(), size);
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.heap = self.heap.clone().store(address.offset(i as i64), byte);
        }
        SymBool::fals()
    }

    fn read(&mut self, address: SymBv, size: u32) -> (SymBv, SymBool) {
        let placeholder = self.log.record_read(address.clone(), size);
        let bytes: Vec<SymBv> = (0..size)
            .map(|i| self.heap.select(address.offset(i as i64)))
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
        if !self.finalized {
            self.log.constraints.push(self.end.equals(&self.heap));
            self.finalized = true;
        }
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

    #[test]
    fn test_write_folds_byte_stores() {
        let mut mem = FlatMemory::new("t_mem");
        mem.write(SymBv::constant(0x100, 64), SymBv::constant(0xAABB, 16), 2);
        mem.finalize();
        // One alias binding plus the end-array definition.
        let constraints = mem.generated_constraints();
        assert_eq!(constraints.len(), 2);
        // The heap folded two stores over the start array.
        match &constraints[1] {
            SymBool::ArrayEq(end, heap) => {
                assert_eq!(**end, mem.end_variable());
                assert!(matches!(**heap, SymArray::Store { .. }));
            }
            other => panic!("unexpected end constraint: {other}"),
        }
    }

    #[test]
    fn test_read_binds_placeholder_to_selects() {
        let mut mem = FlatMemory::new("t_mem");
        let (value, fault) = mem.read(SymBv::constant(0x200, 64), 4);
        assert_eq!(value.width(), 32);
        assert_eq!(fault, SymBool::fals());
        // Alias binding plus value binding.
        assert_eq!(mem.generated_constraints().len(), 2);
        assert_eq!(mem.access_list().len(), 1);
    }

    #[test]
    fn test_equality_requires_finalize() {
        let mut a = FlatMemory::new("t_mem");
        let mut b = FlatMemory::new("r_mem");
        assert_eq!(a.equality_constraint(&mut b), Err(MemoryError::NotFinalized));
        a.finalize();
        b.finalize();
        let eq = a.equality_constraint(&mut b).unwrap();
        assert_eq!(eq, a.end_variable().equals(&b.end_variable()));
    }

    #[test]
    fn test_read_after_write_selects_updated_heap() {
        let mut mem = FlatMemory::new("t_mem");
        mem.write(SymBv::constant(0x100, 64), SymBv::constant(7, 8), 1);
        let (_, _) = mem.read(SymBv::constant(0x100, 64), 1);
        // The read constraint must reference the stored heap, not the start
        // array directly.
        let binding = &mem.generated_constraints()[2];
        let text = binding.to_string();
        assert!(text.contains("store"), "read bound to pre-write heap: {text}");
    }
}
