//! Per-run counters collected by the executor.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Nodes invoked, in topological order, before the run ended.
    pub nodes_run: usize,
    /// Values written into the execution state (inputs and outputs).
    pub values_written: usize,
    /// Largest number of values held by the execution state at any point.
    pub peak_live_values: usize,
}

impl ExecutionStats {
    pub(crate) fn observe(&mut self, live: usize) {
        self.peak_live_values = self.peak_live_values.max(live);
    }
}
