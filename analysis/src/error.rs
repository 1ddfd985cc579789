//! Error types for routability analysis.
//!
//! Every error here is fatal to the run: metrics from a partially failed
//! analysis would be misleading, so there is no local recovery.

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// A user option or derived setting is unusable.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// The graph or architecture violates a structural assumption.
    #[error("graph invariant violated: {reason}")]
    GraphInvariant { reason: String },

    /// A computed probability left the [0, 1] range.
    #[error("numerical invariant violated: {reason}")]
    NumericalInvariant { reason: String },

    /// Worker thread creation or join failed.
    #[error("resource error: {reason}")]
    Resource { reason: String },
}

impl AnalysisError {
    pub fn config(reason: impl Into<String>) -> Self {
        AnalysisError::Config {
            reason: reason.into(),
        }
    }

    pub fn graph(reason: impl Into<String>) -> Self {
        AnalysisError::GraphInvariant {
            reason: reason.into(),
        }
    }

    pub fn numerical(reason: impl Into<String>) -> Self {
        AnalysisError::NumericalInvariant {
            reason: reason.into(),
        }
    }

    pub fn resource(reason: impl Into<String>) -> Self {
        AnalysisError::Resource {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_reason() {
        let err = AnalysisError::graph("distance mismatch 3 vs 4");
        let msg = err.to_string();
        assert!(msg.contains("graph invariant"));
        assert!(msg.contains("3 vs 4"));
    }

    #[test]
    fn numerical_display() {
        let err = AnalysisError::numerical("probability 1.5 above 1");
        assert!(err.to_string().contains("numerical invariant"));
    }
}
