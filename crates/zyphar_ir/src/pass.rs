//! Pass-runner contract for invoking synthesis passes.

/// Errors produced by a pass runner.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// The command named a pass the runner does not provide.
    #[error("unknown pass: {name}")]
    UnknownPass {
        /// The pass name from the command string.
        name: String,
    },

    /// The pass ran but failed.
    #[error("pass `{name}` failed: {reason}")]
    Failed {
        /// The pass name from the command string.
        name: String,
        /// Description of the failure.
        reason: String,
    },
}

/// Invokes named synthesis passes on a design.
///
/// The command string is the pass name followed by flags and, optionally,
/// a trailing selection of module names restricting the pass's scope
/// (e.g. `"opt -full alu regs"`). An empty selection means the whole
/// design.
pub trait PassRunner {
    /// Runs a single pass command against the design.
    fn call(
        &mut self,
        design: &mut crate::Design,
        command: &str,
    ) -> Result<(), PassError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pass_display() {
        let err = PassError::UnknownPass {
            name: "fancy_opt".to_string(),
        };
        assert_eq!(err.to_string(), "unknown pass: fancy_opt");
    }

    #[test]
    fn failed_display() {
        let err = PassError::Failed {
            name: "hierarchy".to_string(),
            reason: "unresolved module `alu`".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("hierarchy"));
        assert!(msg.contains("unresolved module"));
    }
}
