use std::fmt;

/// Point-in-time view over both stores. Computed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending_count: u64,
    pub processing_count: u64,
    pub dead_letter_count: u64,
    pub max_size: usize,
}

impl QueueStats {
    pub fn capacity_pct(&self) -> f64 {
        if self.max_size == 0 {
            return 1.0;
        }
        self.pending_count as f64 / self.max_size as f64
    }

    pub fn pressure(&self) -> CapacityPressure {
        CapacityPressure::of(self.pending_count, self.max_size)
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pending:     {}", self.pending_count)?;
        writeln!(f, "processing:  {}", self.processing_count)?;
        writeln!(f, "dead letter: {}", self.dead_letter_count)?;
        write!(
            f,
            "capacity:    {}/{} ({:.0}%)",
            self.pending_count,
            self.max_size,
            self.capacity_pct() * 100.0
        )?;
        match self.pressure() {
            CapacityPressure::Normal => Ok(()),
            CapacityPressure::Warning => write!(f, "  [nearing capacity]"),
            CapacityPressure::Critical => write!(f, "  [over capacity]"),
        }
    }
}

/// Soft-limit pressure level: warn from 80% of capacity, error-log from 100%.
/// Work is accepted at every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityPressure {
    Normal,
    Warning,
    Critical,
}

impl CapacityPressure {
    pub fn of(pending: u64, max_size: usize) -> Self {
        let max = max_size as u64;
        if pending >= max {
            CapacityPressure::Critical
        } else if pending * 5 >= max * 4 {
            CapacityPressure::Warning
        } else {
            CapacityPressure::Normal
        }
    }
}
