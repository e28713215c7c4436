use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker attached to every asynchronous completion so that results issued
/// before a cancel or reset can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Monotonic generation source owned by a single component.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate everything issued so far and return the new generation
    pub fn advance(&mut self) -> Generation {
        self.current += 1;
        Generation(self.current)
    }

    pub fn current(&self) -> Generation {
        Generation(self.current)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        generation.0 == self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_invalidates_previous() {
        let mut counter = GenerationCounter::new();
        let first = counter.advance();
        assert!(counter.is_current(first));

        let second = counter.advance();
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
        assert!(second > first);
    }
}
