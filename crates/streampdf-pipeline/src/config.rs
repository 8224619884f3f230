//! Analysis configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of bins per row
pub const DEFAULT_NBINS: usize = 1000;

/// Configuration of one analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Field variables reduced each step
    pub fields: Vec<String>,
    /// Number of equal-width bins per row
    pub nbins: usize,
    /// Pass the raw fields through to the output alongside the PDFs
    pub write_input: bool,
    /// Upper bound on one `begin_step` wait
    pub step_timeout: Duration,
    /// Sleep between not-ready polls
    pub poll_interval: Duration,
    /// Consecutive not-ready polls tolerated before the run fails
    pub max_not_ready_polls: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fields: vec!["U".to_string(), "V".to_string()],
            nbins: DEFAULT_NBINS,
            write_input: false,
            step_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            max_not_ready_polls: 120,
        }
    }
}

impl AnalysisConfig {
    /// Apply the CLI bin-count rule: positive values override the default,
    /// anything else keeps it
    pub fn with_nbins_arg(mut self, value: i64) -> Self {
        if value > 0 {
            self.nbins = value as usize;
        }
        self
    }

    /// Case-insensitive `"yes"` enables raw-field passthrough
    pub fn with_write_input_flag(mut self, flag: &str) -> Self {
        self.write_input = flag.eq_ignore_ascii_case("yes");
        self
    }
}
