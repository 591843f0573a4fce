//! AC small-signal frequency sweep.
//!
//! After the operating point every device records its small-signal
//! conductances and capacitances. Each frequency point then stamps
//! `G + jωC` with the source excitations and solves the complex system.
//!
//! Frequency points are generated according to sweep type:
//!   - DEC: logarithmic, n_points per decade
//!   - OCT: logarithmic, n_points per octave
//!   - LIN: linear, n_points total

use super::op::operating_point;
use super::{begin_solution_plot, Analysis, OutputSink, PauseFlag, PlotId, RunStatus};
use crate::circuit::Circuit;
use crate::context::{AnalysisMode, InitPhase};
use crate::error::{NodalError, Result};
use crate::report::Severity;
use serde_derive::Deserialize;
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcSweepType {
    Dec,
    Oct,
    Lin,
}

#[derive(Debug, Clone)]
pub struct AcAnalysis {
    sweep_type: AcSweepType,
    n_points: usize,
    f_start: f64,
    f_stop: f64,
    frequencies: Vec<f64>,
    next: usize,
    plot: Option<PlotId>,
}

impl AcAnalysis {
    /// The sweep is checked when the analysis first runs.
    pub fn new(sweep_type: AcSweepType, n_points: usize, f_start: f64, f_stop: f64) -> Self {
        Self {
            sweep_type,
            n_points,
            f_start,
            f_stop,
            frequencies: Vec::new(),
            next: 0,
            plot: None,
        }
    }

    /// Frequencies of the sweep in progress; empty before the first run.
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Operating point, then one small-signal load so devices record
    /// their linearized parameters.
    fn prepare(&self, circuit: &mut Circuit) -> Result<()> {
        operating_point(circuit, AnalysisMode::DcOp)?;
        circuit.ctx.phase = InitPhase::SmallSignal;
        circuit.load()?;
        circuit.ctx.mode = AnalysisMode::Ac;
        circuit.matrix.reorder();
        Ok(())
    }
}

impl Analysis for AcAnalysis {
    fn name(&self) -> &'static str {
        "ac"
    }

    fn run(&mut self, circuit: &mut Circuit, sink: &mut dyn OutputSink, pause: &PauseFlag) -> Result<RunStatus> {
        let _span = tracing::info_span!("ac_analysis", n_points = self.n_points).entered();
        circuit.require("AC", |c| c.ac)?;
        let plot = match self.plot {
            Some(p) => p,
            None => {
                self.frequencies = generate_frequencies(self.sweep_type, self.n_points, self.f_start, self.f_stop)?;
                self.prepare(circuit)?;
                let p = begin_solution_plot(circuit, sink, "ac", "AC analysis", "frequency", true);
                self.plot = Some(p);
                p
            }
        };

        while self.next < self.frequencies.len() {
            if pause.take() {
                tracing::info!(point = self.next, "ac sweep paused");
                return Ok(RunStatus::Paused);
            }
            let f = self.frequencies[self.next];
            circuit.ctx.mode = AnalysisMode::Ac;
            circuit.ctx.omega = 2.0 * PI * f;
            circuit.ac_load()?;
            let solved = circuit.matrix.factor_and_solve_complex(&mut circuit.ctx.ac_rhs);
            circuit.ctx.stats.linear_solves += 1;
            match solved {
                Ok(()) => sink.dump_complex(plot, f, &circuit.ctx.ac_rhs[1..]),
                Err(e @ NodalError::SingularMatrix { .. }) => {
                    let msg = format!("skipping {f} Hz: {e}");
                    circuit.reporter_mut().report(Severity::Warning, "ac", &msg);
                }
                Err(e) => return Err(e),
            }
            self.next += 1;
        }

        let (factorizations, reorders) = circuit.matrix.solver_counters();
        circuit.ctx.stats.factorizations = factorizations;
        circuit.ctx.stats.reorders = reorders;
        self.next = 0;
        self.plot = None;
        Ok(RunStatus::Completed)
    }
}

/// Generate frequency points for the given sweep type.
///
/// Logarithmic sweeps need `0 < f_start <= f_stop`; a linear sweep needs
/// `0 <= f_start <= f_stop`. Every sweep needs at least one point.
pub fn generate_frequencies(
    sweep_type: AcSweepType,
    n_points: usize,
    f_start: f64,
    f_stop: f64,
) -> Result<Vec<f64>> {
    let log = sweep_type != AcSweepType::Lin;
    let valid = n_points > 0
        && f_start.is_finite()
        && f_stop.is_finite()
        && f_start <= f_stop
        && if log { f_start > 0.0 } else { f_start >= 0.0 };
    if !valid {
        return Err(NodalError::Analysis(format!(
            "invalid AC sweep: {sweep_type:?} {n_points} points from {f_start} Hz to {f_stop} Hz"
        )));
    }

    let per_unit = |base: f64, units: f64| -> Vec<f64> {
        let total = (n_points as f64 * units).ceil() as usize + 1;
        (0..total)
            .map(|i| f_start * base.powf(i as f64 / n_points as f64))
            .take_while(|&f| f <= f_stop * (1.0 + 1e-9))
            .collect()
    };
    Ok(match sweep_type {
        AcSweepType::Dec => per_unit(10.0, (f_stop / f_start).log10()),
        AcSweepType::Oct => per_unit(2.0, (f_stop / f_start).log2()),
        AcSweepType::Lin if n_points == 1 => vec![f_start],
        AcSweepType::Lin => {
            let step = (f_stop - f_start) / (n_points - 1) as f64;
            (0..n_points).map(|i| f_start + step * i as f64).collect()
        }
    })
}
