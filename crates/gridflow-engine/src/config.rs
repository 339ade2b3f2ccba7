//! Engine-wide tunables, set once at workbook construction via a builder.

/// Builder-style configuration for a [`crate::workbook::Workbook`].
///
/// Mirrors the evaluator's own config-struct convention: every knob has a
/// sane default and a `with_*` setter, so callers only override what they
/// need to.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub(crate) threads: usize,
    pub(crate) default_rows: u32,
    pub(crate) default_cols: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: default_thread_count(),
            default_rows: 1_048_576,
            default_cols: 16_384,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker threads `calculate` spins up. `0` forces the serial fallback
    /// path regardless of how many cores are available.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_sheet_bounds(mut self, rows: u32, cols: u32) -> Self {
        self.default_rows = rows;
        self.default_cols = cols;
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

fn default_thread_count() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_picks_at_least_one_thread() {
        assert!(EngineConfig::default().threads() >= 1);
    }

    #[test]
    fn with_threads_overrides_the_default() {
        let cfg = EngineConfig::new().with_threads(0);
        assert_eq!(cfg.threads(), 0);
    }
}
