//! Cell-based aliasing memory model.
//!
//! Accesses are only recorded during execution; nothing is encoded until
//! [`ArmMemory::equality_constraint`] sees both programs' access lists.
//! At that point [`assign_cells`](super::cells::assign_cells) partitions
//! the combined list into cells, and for each resulting assignment this
//! module builds per-cell value chains: every cell byte starts as a select
//! from the program's start array, writes overwrite bytes in program
//! order, and each read placeholder is bound to the bytes it covers. All
//! bindings are conditioned on the assignment's guard, the disjunction of
//! the guards is asserted, and each end array is pinned to its start array
//! with the dirty cells' final bytes stored on top, so untouched memory is
//! equal by construction and the end-state equality formula reduces to an
//! array equality.

use tracing::debug;

use crate::error::{MemoryError, MemoryResult};
use crate::expr::{SymArray, SymBool, SymBv};
use crate::memory::cells::{assign_cells, Assignment, Cell};
use crate::memory::{AccessLog, MemAccess, MemConfig, SymbolicMemory};

/// Introspection data from the most recent equality encoding.
#[derive(Debug, Clone)]
pub struct ArmReport {
    /// Number of feasible cell assignments the search produced.
    pub assignments: usize,
    /// Cells of the first assignment, with dirty flags and cached final
    /// values filled in.
    pub cells: Vec<Cell>,
    /// Combined access list, resolved against the first assignment.
    pub accesses: Vec<MemAccess>,
}

#[derive(Debug)]
pub struct ArmMemory {
    log: AccessLog,
    start: SymArray,
    end: SymArray,
    config: MemConfig,
    finalized: bool,
    eq_cache: Option<SymBool>,
    report: Option<ArmReport>,
}

impl ArmMemory {
    pub fn new(config: MemConfig, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            start: SymArray::var(format!("{prefix}_start")),
            end: SymArray::var(format!("{prefix}_end")),
            log: AccessLog::new(prefix),
            config,
            finalized: false,
            eq_cache: None,
            report: None,
        }
    }

    /// Cell layout and resolved accesses from the last equality encoding,
    /// if one has run.
    pub fn report(&self) -> Option<&ArmReport> {
        self.report.as_ref()
    }

    /// End-state equality with another cell-based instance.
    ///
    /// First call runs the assignment search and pushes every generated
    /// constraint onto `self`; later calls return the cached formula.
    pub fn equality_constraint(&mut self, other: &mut ArmMemory) -> MemoryResult<SymBool> {
        if !self.finalized || !other.finalized {
            return Err(MemoryError::NotFinalized);
        }
        if let Some(cached) = &self.eq_cache {
            return Ok(cached.clone());
        }

        let mut combined: Vec<MemAccess> = self
            .log
            .accesses
            .iter()
            .cloned()
            .chain(other.log.accesses.iter().cloned().map(|mut a| {
                a.is_other = true;
                a
            }))
            .collect();
        for (index, access) in combined.iter_mut().enumerate() {
            access.index = index;
        }

        let assignments = assign_cells(&combined, &self.config)?;
        debug!(
            accesses = combined.len(),
            assignments = assignments.len(),
            "encoding cell-based memory equality"
        );

        let mut report_cells = Vec::new();
        for (ai, assignment) in assignments.iter().enumerate() {
            let guard = assignment.guard_formula();
            let mut self_end = self.start.clone();
            let mut other_end = other.start.clone();
            for cell in &assignment.cells {
                let own = chain_side(&combined, cell, false, &self.start, &guard);
                let theirs = chain_side(&combined, cell, true, &other.start, &guard);
                self.log.constraints.extend(own.bindings);
                self.log.constraints.extend(theirs.bindings);
                if own.dirty {
                    self_end = store_span(self_end, cell, &own.bytes);
                }
                if theirs.dirty {
                    other_end = store_span(other_end, cell, &theirs.bytes);
                }
                if ai == 0 {
                    let mut resolved = cell.clone();
                    resolved.dirty = own.dirty;
                    resolved.other_dirty = theirs.dirty;
                    resolved.cache = Some(SymBv::from_le_bytes(&own.bytes));
                    resolved.other_cache = Some(SymBv::from_le_bytes(&theirs.bytes));
                    report_cells.push(resolved);
                }
            }
            self.log
                .constraints
                .push(SymBool::implies(guard.clone(), self.end.equals(&self_end)));
            self.log
                .constraints
                .push(SymBool::implies(guard, other.end.equals(&other_end)));
        }

        // The guards at every decision point of the search cover all
        // address arrangements, so their disjunction is valid; asserting it
        // lets the solver pick an assignment instead of leaving the end
        // arrays unconstrained.
        self.log.constraints.push(SymBool::disjoin(
            assignments.iter().map(Assignment::guard_formula),
        ));

        for (ci, cell) in report_cells.iter().enumerate() {
            for member in &cell.members {
                combined[member.access].cell = Some(ci);
                combined[member.access].cell_offset = member.offset;
            }
        }
        self.report = Some(ArmReport {
            assignments: assignments.len(),
            cells: report_cells,
            accesses: combined,
        });

        let eq = self.end.equals(&other.end);
        self.eq_cache = Some(eq.clone());
        Ok(eq)
    }
}

struct SideChain {
    bytes: Vec<SymBv>,
    dirty: bool,
    bindings: Vec<SymBool>,
}

/// Walk one program's accesses to `cell` in program order, tracking the
/// cell's byte contents and binding each read placeholder to the bytes it
/// covers under `guard`.
fn chain_side(
    combined: &[MemAccess],
    cell: &Cell,
    side: bool,
    start: &SymArray,
    guard: &SymBool,
) -> SideChain {
    let mut bytes: Vec<SymBv> = (0..cell.span())
        .map(|i| start.select(cell.base.offset(cell.min_offset + i)))
        .collect();
    let mut dirty = false;
    let mut bindings = Vec::new();
    for member in &cell.members {
        let access = &combined[member.access];
        if access.is_other != side {
            continue;
        }
        let pos = (member.offset - cell.min_offset) as usize;
        let len = access.size as usize;
        if access.write {
            bytes[pos..pos + len].clone_from_slice(&access.value.to_le_bytes());
            dirty = true;
        } else {
            let value = SymBv::from_le_bytes(&bytes[pos..pos + len]);
            bindings.push(SymBool::implies(guard.clone(), access.value.equals(&value)));
        }
    }
    SideChain {
        bytes,
        dirty,
        bindings,
    }
}

fn store_span(mut array: SymArray, cell: &Cell, bytes: &[SymBv]) -> SymArray {
    for (i, byte) in bytes.iter().enumerate() {
        array = array.store(cell.base.offset(cell.min_offset + i as i64), byte.clone());
    }
    array
}

impl SymbolicMemory for ArmMemory {
    fn write(&mut self, address: SymBv, value: SymBv, size: u32) -> SymBool {
        self.log.record_write(address, value, size);
        SymBool::fals()
    }

    fn read(&mut self, address: SymBv, size: u32) -> (SymBv, SymBool) {
        // The placeholder stays unbound until equality encoding resolves
        // the cell layout.
        (self.log.record_read(address, size), SymBool::fals())
    }

    fn start_variable(&self) -> SymArray {
        self.start.clone()
    }

    fn end_variable(&self) -> SymArray {
        self.end.clone()
    }

    fn finalize(&mut self) {
        self.finalized = true;
    }

    fn generated_constraints(&self) -> Vec<SymBool> {
        self.log.constraints.clone()
    }

    fn access_list(&self) -> &[(SymBv, u32)] {
        &self.log.access_list
    }
}
