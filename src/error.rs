use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodalError {
    #[error("{device}: fatal parameter error: {reason}")]
    ParameterFatal { device: String, reason: String },

    #[error("{device}: unknown parameter '{param}'")]
    BadParam { device: String, param: String },

    #[error("Newton iteration did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("singular matrix: no acceptable pivot in column {column}")]
    SingularMatrix { column: usize },

    #[error("device {device} does not support {analysis} analysis")]
    DeviceTypeUnsupported { device: String, analysis: &'static str },

    #[error("Timestep error: {0}")]
    Timestep(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Deck error: {0}")]
    Deck(String),

    #[error("Deck syntax error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodalError {
    /// Errors the analysis drivers may recover from by retrying with a
    /// smaller step, stepping gmin or skipping a sweep point.
    pub fn is_convergence_failure(&self) -> bool {
        matches!(
            self,
            NodalError::NonConvergence { .. } | NodalError::SingularMatrix { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, NodalError>;
