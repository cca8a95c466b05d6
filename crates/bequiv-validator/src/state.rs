//! Concrete machine states for counterexamples and testcases.

use std::collections::BTreeMap;

use bequiv_cfg::{BlockId, NUM_REGS};
use serde::{Deserialize, Serialize};

/// A concrete snapshot of the machine: register file, the bytes of every
/// touched memory location, and per-block execution counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub regs: [u64; NUM_REGS],
    /// Sparse byte memory; untouched addresses are unconstrained.
    pub memory: BTreeMap<u64, u8>,
    pub ghosts: BTreeMap<BlockId, u64>,
}

impl Default for CpuState {
    fn default() -> Self {
        Self {
            regs: [0; NUM_REGS],
            memory: BTreeMap::new(),
            ghosts: BTreeMap::new(),
        }
    }
}

impl CpuState {
    /// Read `size` little-endian bytes at `addr`; absent bytes read as 0.
    pub fn read_mem(&self, addr: u64, size: u32) -> u64 {
        let mut value = 0u64;
        for i in (0..size as u64).rev() {
            let byte = self
                .memory
                .get(&addr.wrapping_add(i))
                .copied()
                .unwrap_or(0);
            value = (value << 8) | u64::from(byte);
        }
        value
    }

    /// Store the low `size` bytes of `value` at `addr`, little-endian.
    pub fn write_mem(&mut self, addr: u64, value: u64, size: u32) {
        for i in 0..size as u64 {
            self.memory
                .insert(addr.wrapping_add(i), (value >> (8 * i)) as u8);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_round_trips_little_endian() {
        let mut state = CpuState::default();
        state.write_mem(0x1000, 0xDEADBEEF, 4);
        assert_eq!(state.read_mem(0x1000, 4), 0xDEADBEEF);
        assert_eq!(state.memory[&0x1000], 0xEF);
        assert_eq!(state.memory[&0x1003], 0xDE);
    }

    #[test]
    fn test_absent_bytes_read_as_zero() {
        let mut state = CpuState::default();
        state.memory.insert(0x2001, 0xAB);
        assert_eq!(state.read_mem(0x2000, 2), 0xAB00);
        assert_eq!(state.read_mem(0x3000, 8), 0);
    }
}
