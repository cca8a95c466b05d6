//! Obligation filters.
//!
//! A filter can reject an obligation before any solver work happens; the
//! rejection reason is surfaced as an error result through the normal
//! callback.

use bequiv_cfg::{BlockId, Cfg};

pub trait Filter: Send + Sync {
    /// `Err` carries the human-readable rejection reason.
    fn accept(
        &self,
        target: &Cfg,
        rewrite: &Cfg,
        target_path: &[BlockId],
        rewrite_path: &[BlockId],
    ) -> Result<(), String>;
}

/// Accepts every obligation.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFilter;

impl Filter for DefaultFilter {
    fn accept(
        &self,
        _target: &Cfg,
        _rewrite: &Cfg,
        _target_path: &[BlockId],
        _rewrite_path: &[BlockId],
    ) -> Result<(), String> {
        Ok(())
    }
}

/// Rejects obligations whose paths exceed a length bound.
#[derive(Debug, Clone, Copy)]
pub struct PathLengthFilter {
    pub max_len: usize,
}

impl Filter for PathLengthFilter {
    fn accept(
        &self,
        _target: &Cfg,
        _rewrite: &Cfg,
        target_path: &[BlockId],
        rewrite_path: &[BlockId],
    ) -> Result<(), String> {
        let longest = target_path.len().max(rewrite_path.len());
        if longest > self.max_len {
            Err(format!(
                "path length {longest} exceeds bound {}",
                self.max_len
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bequiv_cfg::{Block, CfgBuilder};

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

    #[test]
    fn test_default_filter_accepts() {
        let cfg = trivial_cfg();
        assert!(DefaultFilter.accept(&cfg, &cfg, &[0], &[0]).is_ok());
    }

    #[test]
    fn test_path_length_filter_rejects_long_paths() {
        let cfg = trivial_cfg();
        let filter = PathLengthFilter { max_len: 2 };
        assert!(filter.accept(&cfg, &cfg, &[0, 0], &[0]).is_ok());
        let rejection = filter.accept(&cfg, &cfg, &[0, 0, 0], &[0]).unwrap_err();
        assert!(rejection.contains("exceeds bound 2"));
    }
}
