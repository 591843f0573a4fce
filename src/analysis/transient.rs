//! Transient (time-domain) analysis.
//!
//! Starts from the operating point (or from initial conditions with
//! `uic`), takes a backward-Euler first step and continues with the
//! trapezoidal rule. Each time point is a Newton solve with the `itl4`
//! limit. A failed solve cuts the step by 8 and drops to first order; a
//! converged point is accepted when the truncation-error step of every
//! charge is at least 90% of the step just taken, and the next step is
//! bounded by twice the present one.

use super::op::operating_point;
use super::{begin_solution_plot, dump_solution, Analysis, OutputSink, PauseFlag, PlotId, RunStatus};
use crate::circuit::Circuit;
use crate::context::{AnalysisMode, InitPhase};
use crate::error::{NodalError, Result};
use crate::newton;
use crate::options::IntegrationMethod;
use std::time::Instant;

/// Position of a transient run between calls to `run`.
#[derive(Debug, Clone)]
struct Progress {
    plot: PlotId,
    /// Time of the last accepted point.
    time: f64,
    /// Step to try next.
    delta: f64,
    order: usize,
    tmax: f64,
    delmin: f64,
    first: bool,
    rejections: usize,
    /// Accepted time from which a singular matrix was last hit.
    singular_at: Option<f64>,
    /// Solution of the last accepted point.
    accepted: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Transient {
    tstep: f64,
    tstop: f64,
    tstart: f64,
    tmax: Option<f64>,
    uic: bool,
    progress: Option<Progress>,
}

impl Transient {
    pub fn new(tstep: f64, tstop: f64) -> Self {
        Self {
            tstep,
            tstop,
            tstart: 0.0,
            tmax: None,
            uic: false,
            progress: None,
        }
    }

    /// Only record points at or after `tstart`.
    pub fn with_start(mut self, tstart: f64) -> Self {
        self.tstart = tstart;
        self
    }

    pub fn with_max_step(mut self, tmax: f64) -> Self {
        self.tmax = Some(tmax);
        self
    }

    /// Skip the operating point and start from device initial conditions.
    pub fn with_uic(mut self, uic: bool) -> Self {
        self.uic = uic;
        self
    }

    fn start(&self, circuit: &mut Circuit, sink: &mut dyn OutputSink) -> Result<Progress> {
        if !(self.tstep > 0.0 && self.tstop > 0.0) || self.tstart >= self.tstop {
            return Err(NodalError::Analysis(format!(
                "invalid transient interval: step {} stop {} start {}",
                self.tstep, self.tstop, self.tstart
            )));
        }
        circuit.setup()?;
        if self.uic {
            let ctx = &mut circuit.ctx;
            ctx.mode = AnalysisMode::TranOp;
            // Junction devices read their `ic` values in this phase.
            ctx.phase = InitPhase::Junction;
            ctx.uic = true;
            ctx.rhs_old.iter_mut().for_each(|v| *v = 0.0);
            ctx.state0.iter_mut().for_each(|v| *v = 0.0);
            circuit.load()?;
        } else {
            circuit.ctx.uic = false;
            operating_point(circuit, AnalysisMode::TranOp)?;
        }
        circuit.get_ic();

        let ctx = &mut circuit.ctx;
        ctx.history.clear();
        ctx.time = 0.0;
        if let Some((_, s)) = ctx.history.link_new(0.0) {
            s.clear();
            s.extend_from_slice(&ctx.state0);
        }

        let plot = begin_solution_plot(circuit, sink, "tran", "Transient analysis", "time", false);
        if self.tstart <= 0.0 {
            dump_solution(circuit, sink, plot, 0.0);
        }

        let tmax = self
            .tmax
            .unwrap_or_else(|| self.tstep.min((self.tstop - self.tstart) / 50.0));
        Ok(Progress {
            plot,
            time: 0.0,
            delta: (self.tstop / 100.0).min(self.tstep) / 10.0,
            order: 1,
            tmax,
            delmin: 1e-11 * tmax,
            first: true,
            rejections: 0,
            singular_at: None,
            accepted: circuit.ctx.rhs_old.clone(),
        })
    }

    /// Count a rejected attempt and check the step still makes progress.
    fn reject(&self, circuit: &mut Circuit, p: &mut Progress, reason: &str) -> Result<()> {
        circuit.ctx.rhs_old.copy_from_slice(&p.accepted);
        circuit.ctx.stats.timesteps_rejected += 1;
        p.rejections += 1;
        tracing::debug!(time = p.time, delta = p.delta, reason, "time step rejected");
        if p.delta < p.delmin {
            return Err(NodalError::Timestep(format!(
                "timestep too small at t = {:.6e}: {} < {:.3e} ({reason})",
                p.time, p.delta, p.delmin
            )));
        }
        if p.rejections > circuit.ctx.options.max_rejections {
            return Err(NodalError::Timestep(format!(
                "{} consecutive rejected steps at t = {:.6e} ({reason})",
                p.rejections, p.time
            )));
        }
        Ok(())
    }

    fn advance(&self, circuit: &mut Circuit, sink: &mut dyn OutputSink, p: &mut Progress, pause: &PauseFlag) -> Result<RunStatus> {
        let opts = circuit.ctx.options.clone();
        let raise_order = opts.method == IntegrationMethod::Trap && opts.max_order >= 2;

        while self.tstop - p.time > p.delmin {
            if pause.take() {
                tracing::info!(time = p.time, "transient paused");
                return Ok(RunStatus::Paused);
            }
            let h = p.delta.min(p.tmax).min(self.tstop - p.time);
            let ctx = &mut circuit.ctx;
            ctx.mode = AnalysisMode::Transient;
            ctx.time = p.time + h;
            ctx.delta = h;
            ctx.order = p.order;
            ctx.compute_coefficients();
            ctx.phase = if p.first { InitPhase::Transient } else { InitPhase::Predict };

            match newton::solve(circuit, opts.itl4) {
                Ok(_) => {}
                Err(e) if e.is_convergence_failure() => {
                    if matches!(e, NodalError::SingularMatrix { .. }) {
                        if p.singular_at == Some(p.time) {
                            tracing::error!(time = p.time, "singular matrix persists under step reduction");
                            return Err(e);
                        }
                        p.singular_at = Some(p.time);
                    }
                    p.delta = h / 8.0;
                    p.order = 1;
                    self.reject(circuit, p, &e.to_string())?;
                    continue;
                }
                Err(e) => return Err(e),
            }

            let mut next = 2.0 * h;
            if !p.first {
                let trunc = circuit.trunc(f64::INFINITY);
                if trunc < 0.9 * h {
                    p.delta = trunc;
                    self.reject(circuit, p, "truncation error")?;
                    continue;
                }
                next = next.min(trunc);
            }

            let ctx = &mut circuit.ctx;
            let Some((_, s)) = ctx.history.link_new(ctx.time) else {
                return Err(NodalError::Timestep(format!("time did not advance past {:.6e}", p.time)));
            };
            s.clear();
            s.extend_from_slice(&ctx.state0);
            ctx.history.retain_newest(opts.max_order + 2);
            ctx.stats.timesteps_accepted += 1;

            p.time = ctx.time;
            p.accepted.copy_from_slice(&ctx.rhs_old);
            p.rejections = 0;
            p.singular_at = None;
            if raise_order && !p.first {
                p.order = 2;
            }
            p.first = false;
            p.delta = next;
            if p.time >= self.tstart {
                dump_solution(circuit, sink, p.plot, p.time);
            }
        }
        Ok(RunStatus::Completed)
    }
}

impl Analysis for Transient {
    fn name(&self) -> &'static str {
        "tran"
    }

    fn run(&mut self, circuit: &mut Circuit, sink: &mut dyn OutputSink, pause: &PauseFlag) -> Result<RunStatus> {
        let _span = tracing::info_span!("transient_analysis", tstop = self.tstop, tstep = self.tstep).entered();
        let started = Instant::now();
        let mut progress = match self.progress.take() {
            Some(p) => p,
            None => self.start(circuit, sink)?,
        };
        let status = self.advance(circuit, sink, &mut progress, pause)?;
        circuit.ctx.stats.add_phase("Transient", started.elapsed());
        if status == RunStatus::Paused {
            self.progress = Some(progress);
        } else {
            tracing::info!(
                accepted = circuit.ctx.stats.timesteps_accepted,
                rejected = circuit.ctx.stats.timesteps_rejected,
                "transient complete"
            );
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Recorder;
    use crate::options::SimOptions;

    #[test]
    fn invalid_interval_rejected() {
        let mut ckt = Circuit::new(SimOptions::default());
        let mut rec = Recorder::new();
        let err = Transient::new(0.0, 1e-6)
            .run(&mut ckt, &mut rec, &PauseFlag::new())
            .unwrap_err();
        assert!(matches!(err, NodalError::Analysis(_)));
        let err = Transient::new(1e-9, 1e-6)
            .with_start(2e-6)
            .run(&mut ckt, &mut rec, &PauseFlag::new())
            .unwrap_err();
        assert!(matches!(err, NodalError::Analysis(_)));
    }
}
