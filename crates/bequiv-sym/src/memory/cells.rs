//! Cell assignment for the cell-based aliasing strategy.
//!
//! Given the combined access list of two programs, decide how many
//! independent storage locations ("cells") are needed and where each access
//! lands in them. Accesses with a statically known relative offset (the
//! [`AccessOffsets`] table) are clustered deterministically; everything
//! else is resolved by an explicit backtracking search. At each step the
//! next access is, per ambiguous cell, either disjoint from it or pinned to
//! it at one of the overlapping byte displacements, and the search
//! enumerates the full product of those per-cell cases. Pinning to several
//! cells at once folds them into a single spanning cell, so an access that
//! straddles two previously placed cells still has a branch. Every branch
//! carries a guard formula describing the address arrangement under which
//! it applies, and the per-cell cases are exhaustive and mutually
//! exclusive, so no alias possibility is ever silently dropped.
//!
//! The search is exponential in the number of mutually ambiguous cells and
//! is bounded by [`MemConfig::max_alias_cases`].
//!
//! Address arithmetic is assumed non-wrapping; callers that cannot rule out
//! wraparound must bound the accessed addresses away from the ends of the
//! address space (the checker's NaCl option does exactly that).

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{MemoryError, MemoryResult};
use crate::expr::{SymBool, SymBv};
use crate::memory::{MemAccess, MemConfig};

/// Statically known byte distances between pairs of accesses.
///
/// `get(i, j)` is `Some(d)` when `address(j) = address(i) + d` holds in
/// every execution; absent entries are the source of branching in the
/// assignment search.
#[derive(Debug, Default)]
pub struct AccessOffsets {
    known: FxHashMap<(usize, usize), i64>,
}

impl AccessOffsets {
    pub fn compute(accesses: &[MemAccess]) -> Self {
        let decomposed: Vec<(Option<SymBv>, i64)> =
            accesses.iter().map(|a| a.address.linear_form()).collect();
        let mut known = FxHashMap::default();
        for i in 0..accesses.len() {
            for j in i + 1..accesses.len() {
                if decomposed[i].0 == decomposed[j].0 {
                    let d = decomposed[j].1 - decomposed[i].1;
                    known.insert((i, j), d);
                    known.insert((j, i), -d);
                }
            }
        }
        Self { known }
    }

    pub fn get(&self, from: usize, to: usize) -> Option<i64> {
        self.known.get(&(from, to)).copied()
    }

    pub fn len(&self) -> usize {
        self.known.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

/// One access placed inside a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellMember {
    /// Index into the combined access list.
    pub access: usize,
    /// Byte offset of the access relative to the cell base.
    pub offset: i64,
}

/// A hypothesized independent storage location.
///
/// `dirty`/`other_dirty` and the cached values are filled in when the value
/// chains are generated; during assignment only the geometry matters.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Symbolic address of offset zero.
    pub base: SymBv,
    /// Lowest occupied byte offset (may be negative after merges).
    pub min_offset: i64,
    /// One past the highest occupied byte offset.
    pub max_offset: i64,
    pub members: Vec<CellMember>,
    /// Base groups contributing to this cell; two cells with a common group
    /// have a statically known relative position.
    pub groups: Vec<usize>,
    /// Whether this program wrote the cell.
    pub dirty: bool,
    /// Whether the other program wrote the cell.
    pub other_dirty: bool,
    /// Final cached value of the whole span for this program.
    pub cache: Option<SymBv>,
    /// Final cached value of the whole span for the other program.
    pub other_cache: Option<SymBv>,
}

impl Cell {
    pub fn span(&self) -> i64 {
        self.max_offset - self.min_offset
    }

    /// Symbolic address of the lowest occupied byte.
    pub fn low_address(&self) -> SymBv {
        self.base.offset(self.min_offset)
    }
}

/// One complete way of partitioning the accesses into cells, valid whenever
/// its guard formula holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub guards: Vec<SymBool>,
    pub cells: Vec<Cell>,
}

impl Assignment {
    pub fn guard_formula(&self) -> SymBool {
        SymBool::conjoin(self.guards.iter().cloned())
    }
}

/// `[aLo, aLo+aLen)` and `[bLo, bLo+bLen)` do not intersect.
fn disjoint(a_lo: &SymBv, a_len: i64, b_lo: &SymBv, b_len: i64) -> SymBool {
    SymBool::or(
        a_lo.offset(a_len).ule(b_lo),
        b_lo.offset(b_len).ule(a_lo),
    )
}

/// Candidate cell produced by the deterministic known-offset clustering.
#[derive(Debug, Clone)]
struct Proto {
    base: SymBv,
    size: i64,
    members: Vec<CellMember>,
    group: usize,
    anchor: usize,
}

fn cluster_known(accesses: &[MemAccess], offsets: &AccessOffsets) -> Vec<Proto> {
    // Transitively connect accesses with known pairwise offsets; each
    // access's position is recorded relative to its group's first access.
    let mut groups: Vec<Vec<(usize, i64)>> = Vec::new();
    let mut placed: Vec<(usize, i64)> = Vec::with_capacity(accesses.len());
    for i in 0..accesses.len() {
        match (0..i).find_map(|j| offsets.get(j, i).map(|d| (j, d))) {
            Some((j, d)) => {
                let (gid, j_pos) = placed[j];
                groups[gid].push((i, j_pos + d));
                placed.push((gid, j_pos + d));
            }
            None => {
                let gid = groups.len();
                groups.push(vec![(i, 0)]);
                placed.push((gid, 0));
            }
        }
    }

    // Same-group accesses share a cell when their intervals overlap or sit
    // within `reach` bytes of each other; a gap of `reach` or more makes a
    // straddling third access impossible, so the cells are provably
    // independent.
    let reach = accesses.iter().map(|a| a.size as i64).max().unwrap_or(1);

    let mut protos = Vec::new();
    for (gid, members) in groups.iter().enumerate() {
        // Positions are relative to the group's first access.
        let anchor = &accesses[members[0].0].address;
        let mut sorted = members.clone();
        sorted.sort_by_key(|&(idx, disp)| (disp, idx));
        let mut cluster: Vec<(usize, i64)> = Vec::new();
        let mut cluster_end = 0i64;
        let flush = |cluster: &[(usize, i64)], protos: &mut Vec<Proto>| {
            if cluster.is_empty() {
                return;
            }
            let min_disp = cluster[0].1;
            let size = cluster
                .iter()
                .map(|&(i, d)| d - min_disp + accesses[i].size as i64)
                .max()
                .unwrap_or(0);
            let base = anchor.offset(min_disp);
            let mut cell_members: Vec<CellMember> = cluster
                .iter()
                .map(|&(i, d)| CellMember {
                    access: i,
                    offset: d - min_disp,
                })
                .collect();
            cell_members.sort_by_key(|m| m.access);
            protos.push(Proto {
                base,
                size,
                members: cell_members,
                group: gid,
                anchor: cluster.iter().map(|&(i, _)| i).min().unwrap_or(0),
            });
        };
        for &(idx, disp) in &sorted {
            if !cluster.is_empty() && disp - cluster_end >= reach {
                flush(&cluster, &mut protos);
                cluster.clear();
            }
            let end = disp + accesses[idx].size as i64;
            if cluster.is_empty() {
                cluster_end = end;
            } else {
                cluster_end = cluster_end.max(end);
            }
            cluster.push((idx, disp));
        }
        flush(&cluster, &mut protos);
    }

    protos.sort_by_key(|p| p.anchor);
    protos
}

#[derive(Clone)]
struct Partial {
    cells: Vec<Cell>,
    guards: Vec<SymBool>,
    next: usize,
}

/// Partition the combined access list into cells.
///
/// Returns every feasible assignment, each paired with the guard under
/// which it applies; the caller asserts the disjunction of the guards and
/// conditions each assignment's value chains on its own guard. The result
/// is deterministic for a given access list.
pub fn assign_cells(
    accesses: &[MemAccess],
    config: &MemConfig,
) -> MemoryResult<Vec<Assignment>> {
    let offsets = AccessOffsets::compute(accesses);
    let protos = cluster_known(accesses, &offsets);

    let mut stack = vec![Partial {
        cells: Vec::new(),
        guards: Vec::new(),
        next: 0,
    }];
    let mut complete = Vec::new();
    let mut explored = 0usize;

    while let Some(state) = stack.pop() {
        explored += 1;
        if explored > config.max_alias_cases {
            return Err(MemoryError::SearchBound {
                limit: config.max_alias_cases,
            });
        }
        if state.next == protos.len() {
            complete.push(Assignment {
                guards: state.guards,
                cells: state.cells,
            });
            continue;
        }

        let unit = &protos[state.next];

        let ambiguous: Vec<usize> = (0..state.cells.len())
            .filter(|&k| !state.cells[k].groups.contains(&unit.group))
            .collect();

        // Per ambiguous cell the unit is either disjoint from it or pinned
        // to it at one of the overlapping byte displacements; the cases are
        // mutually exclusive and cover every address arrangement.
        // Enumerating their full product keeps the guards at this decision
        // point exhaustive even when the unit straddles several cells at
        // once. A combo is a set of pins; the unpinned cells are disjoint.
        let mut combos: Vec<Vec<(usize, i64)>> = vec![Vec::new()];
        for &k in &ambiguous {
            let cell = &state.cells[k];
            let lo = cell.min_offset - unit.size + 1;
            let hi = cell.max_offset - 1;
            let mut grown = Vec::new();
            for combo in &combos {
                grown.push(combo.clone());
                for d in lo..=hi {
                    // Two cells pinned through the unit get implied
                    // positions; when their disjointness is already
                    // guard-enforced, a combo placing them on top of each
                    // other is unsatisfiable and can be dropped.
                    let compatible = combo.iter().all(|&(k1, d1)| {
                        let c1 = &state.cells[k1];
                        if c1.groups.iter().any(|g| cell.groups.contains(g)) {
                            return true;
                        }
                        c1.max_offset - d1 <= cell.min_offset - d
                            || cell.max_offset - d <= c1.min_offset - d1
                    });
                    if !compatible {
                        continue;
                    }
                    let mut pinned = combo.clone();
                    pinned.push((k, d));
                    grown.push(pinned);
                }
            }
            combos = grown;
        }

        // Pop preference: pin to the most recent cell at the lowest
        // displacement, then the remaining single pins, then straddle
        // unions, fresh cell last.
        combos.sort_by(|a, b| match (a.len(), b.len()) {
            (0, 0) => Ordering::Equal,
            (0, _) => Ordering::Greater,
            (_, 0) => Ordering::Less,
            (1, 1) => b[0].0.cmp(&a[0].0).then(a[0].1.cmp(&b[0].1)),
            (1, _) => Ordering::Less,
            (_, 1) => Ordering::Greater,
            _ => a.cmp(b),
        });

        let mut branches: Vec<Partial> = Vec::with_capacity(combos.len());
        for combo in &combos {
            let mut guards = state.guards.clone();
            for &(k, d) in combo {
                guards.push(unit.base.equals(&state.cells[k].base.offset(d)));
            }
            for &k in &ambiguous {
                if combo.iter().any(|&(pinned, _)| pinned == k) {
                    continue;
                }
                guards.push(disjoint(
                    &unit.base,
                    unit.size,
                    &state.cells[k].low_address(),
                    state.cells[k].span(),
                ));
            }

            let mut cells = state.cells.clone();
            if let Some(&(target, d0)) = combo.first() {
                {
                    let merged = &mut cells[target];
                    merged.min_offset = merged.min_offset.min(d0);
                    merged.max_offset = merged.max_offset.max(d0 + unit.size);
                    merged
                        .members
                        .extend(unit.members.iter().map(|m| CellMember {
                            access: m.access,
                            offset: m.offset + d0,
                        }));
                    merged.groups.push(unit.group);
                }
                // Every other pinned cell is positioned through the unit,
                // so it folds into the target cell; highest index first
                // keeps the remaining indices valid.
                for &(k, d) in combo[1..].iter().rev() {
                    let absorbed = cells.remove(k);
                    let shift = d0 - d;
                    let merged = &mut cells[target];
                    merged.min_offset = merged.min_offset.min(absorbed.min_offset + shift);
                    merged.max_offset = merged.max_offset.max(absorbed.max_offset + shift);
                    merged
                        .members
                        .extend(absorbed.members.iter().map(|m| CellMember {
                            access: m.access,
                            offset: m.offset + shift,
                        }));
                    for g in absorbed.groups {
                        if !merged.groups.contains(&g) {
                            merged.groups.push(g);
                        }
                    }
                }
                cells[target].members.sort_by_key(|m| m.access);
            } else {
                cells.push(Cell {
                    base: unit.base.clone(),
                    min_offset: 0,
                    max_offset: unit.size,
                    members: unit.members.clone(),
                    groups: vec![unit.group],
                    dirty: false,
                    other_dirty: false,
                    cache: None,
                    other_cache: None,
                });
            }

            branches.push(Partial {
                cells,
                guards,
                next: state.next + 1,
            });
        }

        stack.extend(branches.into_iter().rev());
    }

    debug!(
        accesses = accesses.len(),
        assignments = complete.len(),
        explored,
        "cell assignment finished"
    );
    Ok(complete)
}
