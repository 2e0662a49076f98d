//! Identifier generation for executions, checkpoints, and listeners.

use uuid::Uuid;

/// Generates the prefixed identifiers used across the runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdGenerator;

impl IdGenerator {
    /// Creates a generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Identifier for one runner instance (`exec-<uuid>`).
    #[must_use]
    pub fn execution_id(&self) -> String {
        format!("exec-{}", Uuid::new_v4())
    }

    /// Identifier for one checkpoint (`cp-<uuid>`).
    #[must_use]
    pub fn checkpoint_id(&self) -> String {
        format!("cp-{}", Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let ids = IdGenerator::new();
        let a = ids.execution_id();
        let b = ids.execution_id();
        assert_ne!(a, b);
        assert!(a.starts_with("exec-"));
        assert!(ids.checkpoint_id().starts_with("cp-"));
    }
}
