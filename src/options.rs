//! Simulator options (the `.options` card of a SPICE deck).

use serde_derive::Deserialize;

/// Numerical integration method used by the transient driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    /// Backward Euler, order 1 throughout.
    Euler,
    /// Trapezoidal rule; the first step after a breakpoint is backward Euler.
    Trap,
}

/// Which linear solver factors the real system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverBackend {
    /// Built-in sparse LU with cached pivot order.
    Native,
    /// faer sparse LU for real systems; complex systems stay on the native LU.
    Faer,
}

impl std::str::FromStr for SolverBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(SolverBackend::Native),
            "faer" => Ok(SolverBackend::Faer),
            other => Err(format!("unknown solver backend '{other}'")),
        }
    }
}

/// Tolerances, iteration limits and environment shared by every analysis.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimOptions {
    /// Relative tolerance for node voltages, branch currents and device currents.
    pub reltol: f64,
    /// Absolute current tolerance (A).
    pub abstol: f64,
    /// Absolute voltage tolerance (V).
    pub vntol: f64,
    /// Charge tolerance (C) used by truncation-error control.
    pub chgtol: f64,
    /// Truncation-error overestimation factor.
    pub trtol: f64,
    /// Minimum conductance added across nonlinear junctions (S).
    pub gmin: f64,
    /// DC operating-point iteration limit.
    pub itl1: usize,
    /// DC sweep iteration limit per point.
    pub itl2: usize,
    /// Transient iteration limit per time point.
    pub itl4: usize,
    pub max_order: usize,
    pub method: IntegrationMethod,
    /// Circuit temperature (K).
    pub temp: f64,
    /// Nominal temperature at which model parameters were extracted (K).
    pub tnom: f64,
    /// Relative pivot threshold.
    pub pivrel: f64,
    /// Absolute pivot threshold.
    pub pivtol: f64,
    /// Number of gmin stepping decades; 0 disables gmin stepping.
    pub gmin_steps: usize,
    /// Maximum source stepping attempts; 0 disables source stepping.
    pub source_steps: usize,
    /// Consecutive time-step rejections before the transient run is abandoned.
    pub max_rejections: usize,
    pub backend: SolverBackend,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            reltol: 1e-3,
            abstol: 1e-12,
            vntol: 1e-6,
            chgtol: 1e-14,
            trtol: 7.0,
            gmin: 1e-12,
            itl1: 100,
            itl2: 50,
            itl4: 10,
            max_order: 2,
            method: IntegrationMethod::Trap,
            temp: crate::device::REFTEMP,
            tnom: crate::device::REFTEMP,
            pivrel: 1e-3,
            pivtol: 1e-13,
            gmin_steps: 10,
            source_steps: 10,
            max_rejections: 20,
            backend: SolverBackend::Native,
        }
    }
}
