//! DC transfer sweep of one independent source.
//!
//! The first point is a full operating point. Later points start from
//! the previous solution with the `itl2` iteration limit and fall back to
//! a full operating point. A point that still fails is reported, counted
//! and skipped.

use super::op::operating_point;
use super::{begin_solution_plot, dump_solution, Analysis, OutputSink, PauseFlag, PlotId, RunStatus};
use crate::circuit::Circuit;
use crate::context::{AnalysisMode, InitPhase};
use crate::error::{NodalError, Result};
use crate::newton;
use crate::report::Severity;

#[derive(Debug, Clone)]
pub struct DcSweep {
    source: String,
    start: f64,
    stop: f64,
    step: f64,
    next: usize,
    plot: Option<PlotId>,
    /// Source value before the sweep, restored when the sweep ends.
    original: Option<f64>,
    /// Whether the solution in the context belongs to the previous point.
    warm: bool,
}

impl DcSweep {
    pub fn new(source: &str, start: f64, stop: f64, step: f64) -> Self {
        Self {
            source: source.to_string(),
            start,
            stop,
            step,
            next: 0,
            plot: None,
            original: None,
            warm: false,
        }
    }

    /// Sweep values, including both end points when `step` divides the range.
    pub fn values(&self) -> Vec<f64> {
        if self.step == 0.0 || (self.stop - self.start) * self.step < 0.0 {
            return vec![self.start];
        }
        let count = ((self.stop - self.start) / self.step + 1e-9).floor() as usize + 1;
        (0..count).map(|i| self.start + self.step * i as f64).collect()
    }

    /// Put the swept source back and forget the sweep position.
    fn finish(&mut self, circuit: &mut Circuit) -> Result<()> {
        self.next = 0;
        self.plot = None;
        self.warm = false;
        match self.original.take() {
            Some(original) => circuit.set_source_value(&self.source, original),
            None => Ok(()),
        }
    }

    fn solve_point(&mut self, circuit: &mut Circuit) -> Result<usize> {
        if self.warm {
            circuit.ctx.mode = AnalysisMode::DcSweep;
            circuit.ctx.phase = InitPhase::Float;
            let itl = circuit.ctx.options.itl2;
            match newton::solve(circuit, itl) {
                Err(e) if e.is_convergence_failure() => {
                    tracing::debug!(error = %e, "warm start failed, solving from scratch");
                }
                other => return other,
            }
        }
        operating_point(circuit, AnalysisMode::DcSweep)
    }
}

impl Analysis for DcSweep {
    fn name(&self) -> &'static str {
        "dc"
    }

    fn run(&mut self, circuit: &mut Circuit, sink: &mut dyn OutputSink, pause: &PauseFlag) -> Result<RunStatus> {
        let _span = tracing::info_span!("dc_sweep", source = %self.source).entered();
        circuit.setup()?;
        if self.original.is_none() {
            self.original = Some(circuit.instance_param(&self.source, "dc").ok_or_else(|| {
                NodalError::Analysis(format!("'{}' is not an independent source", self.source))
            })?);
        }
        let plot = match self.plot {
            Some(p) => p,
            None => {
                let title = format!("DC transfer characteristic of {}", self.source);
                let p = begin_solution_plot(circuit, sink, "dc", &title, &self.source, false);
                self.plot = Some(p);
                p
            }
        };

        let values = self.values();
        while self.next < values.len() {
            if pause.take() {
                tracing::info!(point = self.next, "dc sweep paused");
                return Ok(RunStatus::Paused);
            }
            let value = values[self.next];
            circuit.set_source_value(&self.source, value)?;
            match self.solve_point(circuit) {
                Ok(_) => {
                    dump_solution(circuit, sink, plot, value);
                    self.warm = true;
                }
                Err(e) if e.is_convergence_failure() => {
                    let msg = format!("no convergence at {} = {value}: {e}", self.source);
                    circuit.reporter_mut().report(Severity::Warning, "dc", &msg);
                    circuit.ctx.stats.sweep_points_failed += 1;
                    self.warm = false;
                }
                Err(e) => {
                    self.finish(circuit)?;
                    return Err(e);
                }
            }
            self.next += 1;
        }

        self.finish(circuit)?;
        Ok(RunStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_values_include_end_points() {
        let sweep = DcSweep::new("v1", 0.0, 1.0, 0.25);
        assert_eq!(sweep.values(), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        let down = DcSweep::new("v1", 1.0, 0.0, -0.5);
        assert_eq!(down.values(), vec![1.0, 0.5, 0.0]);
        let wrong_way = DcSweep::new("v1", 0.0, 1.0, -0.5);
        assert_eq!(wrong_way.values(), vec![0.0]);
    }
}
