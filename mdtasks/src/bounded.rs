//! Iteration caps for loops whose termination depends on the shape of the input.
//!
//! A tripped guard ends only the loop it protects and logs once at `warn`.

#[derive(Debug, Clone)]
pub struct IterationGuard {
    label: &'static str,
    limit: usize,
    count: usize,
    tripped: bool,
}

impl IterationGuard {
    pub fn new(label: &'static str, limit: usize) -> Self {
        Self {
            label,
            limit,
            count: 0,
            tripped: false,
        }
    }

    /// Count one iteration. Returns `false` once the cap has been reached.
    pub fn tick(&mut self) -> bool {
        if self.count >= self.limit {
            if !self.tripped {
                self.tripped = true;
                log::warn!(
                    "{}: iteration limit of {} reached, loop aborted",
                    self.label,
                    self.limit
                );
            }
            return false;
        }
        self.count += 1;
        true
    }

    pub fn tripped(&self) -> bool {
        self.tripped
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
