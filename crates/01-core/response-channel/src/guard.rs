use relay_abi::Generation;

/// Monotonic generation counter owned by a channel.
///
/// Every binding change advances the counter. A failure observed against a
/// binding carries the generation read at the time; the channel only acts on
/// it while [`GenerationGuard::is_current`] still holds under the write lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationGuard {
    current: Generation,
}

impl GenerationGuard {
    /// Starts at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    pub fn current(&self) -> Generation {
        self.current
    }

    /// Returns `true` when no binding change happened since `observed` was read.
    pub fn is_current(&self, observed: Generation) -> bool {
        self.current == observed
    }

    /// Moves to the next generation and returns it.
    pub fn advance(&mut self) -> Generation {
        self.current = self.current.next();
        self.current
    }
}
