//! DC operating point.
//!
//! A plain Newton solve is tried first. When it fails the driver falls
//! back to gmin stepping: an extra conductance to ground on every node
//! regularizes the Jacobian and is lowered step by step, each step
//! starting from the last converged solution. If that also fails,
//! source stepping ramps every independent source up from a fraction of
//! its value.

use super::{begin_solution_plot, dump_solution, Analysis, OutputSink, PauseFlag, RunStatus};
use crate::circuit::Circuit;
use crate::context::{AnalysisMode, InitPhase};
use crate::error::Result;
use crate::newton;
use std::time::Instant;

/// Largest jump between two gmin levels, as a factor.
const GMIN_JUMP: f64 = 1e-3;
/// Source stepping gives up once a subdivided step gets this small.
const MIN_SOURCE_STEP: f64 = 1e-6;

/// A converged solution to fall back to when a continuation step fails.
struct Snapshot {
    solution: Vec<f64>,
    states: Vec<f64>,
}

impl Snapshot {
    fn take(circuit: &Circuit) -> Self {
        Self {
            solution: circuit.ctx.rhs_old.clone(),
            states: circuit.ctx.state0.clone(),
        }
    }

    fn restore(&self, circuit: &mut Circuit) {
        circuit.ctx.rhs_old.copy_from_slice(&self.solution);
        circuit.ctx.state0.copy_from_slice(&self.states);
    }
}

/// Solve the operating point in `mode`, leaving it in `ctx.rhs_old`.
pub fn operating_point(circuit: &mut Circuit, mode: AnalysisMode) -> Result<usize> {
    circuit.setup()?;
    let start = Instant::now();
    let ctx = &mut circuit.ctx;
    ctx.mode = mode;
    ctx.phase = InitPhase::Junction;
    ctx.diag_gmin = 0.0;
    ctx.src_fact = 1.0;
    ctx.rhs_old.iter_mut().for_each(|v| *v = 0.0);
    let itl = ctx.options.itl1;

    let result = match newton::solve(circuit, itl) {
        Err(e) if e.is_convergence_failure() => {
            tracing::info!(error = %e, "direct Newton failed, trying continuation methods");
            let mut outcome = Err(e);
            if circuit.ctx.options.gmin_steps > 0 {
                outcome = gmin_stepping(circuit);
            }
            match outcome {
                Err(e) if e.is_convergence_failure() && circuit.ctx.options.source_steps > 0 => {
                    tracing::info!(error = %e, "gmin stepping failed, trying source stepping");
                    source_stepping(circuit)
                }
                other => other,
            }
        }
        other => other,
    };

    let ctx = &mut circuit.ctx;
    ctx.diag_gmin = 0.0;
    ctx.src_fact = 1.0;
    ctx.stats.add_phase("Operating point", start.elapsed());
    if let Ok(iterations) = result {
        tracing::info!(iterations, "operating point converged");
    }
    result
}

/// Lower the extra diagonal conductance from a large value down to zero.
///
/// On success the next level is `GMIN_JUMP` times lower; on failure the
/// jump from the last good level is shortened by taking its square root.
fn gmin_stepping(circuit: &mut Circuit) -> Result<usize> {
    let opts = circuit.ctx.options.clone();
    let floor = opts.gmin;
    let mut target = floor * 10f64.powi(opts.gmin_steps as i32);
    let mut last_good: Option<(f64, Snapshot)> = None;
    let mut factor = GMIN_JUMP;
    let mut subdivisions = 0;
    let mut total = 0;

    circuit.ctx.rhs_old.iter_mut().for_each(|v| *v = 0.0);
    circuit.ctx.phase = InitPhase::Junction;

    loop {
        circuit.ctx.diag_gmin = target;
        tracing::debug!(target, "gmin step");
        match newton::solve(circuit, opts.itl1) {
            Ok(iterations) => {
                total += iterations;
                subdivisions = 0;
                factor = GMIN_JUMP;
                last_good = Some((target, Snapshot::take(circuit)));
                circuit.ctx.phase = InitPhase::Float;
                if target <= floor {
                    break;
                }
                target = (target * factor).max(floor);
            }
            Err(e) if e.is_convergence_failure() => {
                subdivisions += 1;
                if subdivisions > opts.gmin_steps {
                    tracing::error!("gmin stepping exhausted after {subdivisions} subdivisions");
                    circuit.ctx.diag_gmin = 0.0;
                    return Err(e);
                }
                match &last_good {
                    Some((good, snapshot)) => {
                        factor = factor.sqrt();
                        if factor > 0.9 {
                            circuit.ctx.diag_gmin = 0.0;
                            return Err(e);
                        }
                        target = (good * factor).max(floor);
                        snapshot.restore(circuit);
                        circuit.ctx.phase = InitPhase::Float;
                    }
                    None => {
                        // Nothing converged yet: start from a stiffer level.
                        target *= 10.0;
                        circuit.ctx.rhs_old.iter_mut().for_each(|v| *v = 0.0);
                        circuit.ctx.phase = InitPhase::Junction;
                    }
                }
                tracing::debug!(error = %e, target, subdivisions, "gmin step failed, subdividing");
            }
            Err(e) => {
                circuit.ctx.diag_gmin = 0.0;
                return Err(e);
            }
        }
    }

    circuit.ctx.diag_gmin = 0.0;
    circuit.ctx.phase = InitPhase::Float;
    let iterations = newton::solve(circuit, opts.itl1)?;
    tracing::info!("gmin stepping converged");
    Ok(total + iterations)
}

/// Ramp the independent sources from a fraction of their value to full
/// value, growing the step geometrically on success and halving it on
/// failure.
fn source_stepping(circuit: &mut Circuit) -> Result<usize> {
    let opts = circuit.ctx.options.clone();
    let mut last_good = 0.0;
    let mut snapshot: Option<Snapshot> = None;
    let mut target = 0.1_f64;
    let mut subdivisions = 0;
    let mut total = 0;

    circuit.ctx.diag_gmin = 0.0;
    circuit.ctx.rhs_old.iter_mut().for_each(|v| *v = 0.0);
    circuit.ctx.phase = InitPhase::Junction;

    loop {
        circuit.ctx.src_fact = target;
        tracing::debug!(target, "source step");
        match newton::solve(circuit, opts.itl1) {
            Ok(iterations) => {
                total += iterations;
                let prev_step = target - last_good;
                last_good = target;
                subdivisions = 0;
                if (target - 1.0).abs() < 1e-12 {
                    tracing::info!("source stepping converged");
                    return Ok(total);
                }
                snapshot = Some(Snapshot::take(circuit));
                target = (target + prev_step * 2.0).min(1.0);
            }
            Err(e) if e.is_convergence_failure() => {
                subdivisions += 1;
                if subdivisions > 2 * opts.source_steps {
                    tracing::error!("source stepping exhausted after {subdivisions} subdivisions at {target}");
                    return Err(e);
                }
                target = last_good + (target - last_good) / 2.0;
                if target - last_good < MIN_SOURCE_STEP {
                    tracing::error!("source stepping stalled at {last_good}");
                    return Err(e);
                }
                match &snapshot {
                    Some(s) => s.restore(circuit),
                    None => circuit.ctx.rhs_old.iter_mut().for_each(|v| *v = 0.0),
                }
                tracing::debug!(error = %e, target, subdivisions, "source step failed, subdividing");
            }
            Err(e) => return Err(e),
        }
        circuit.ctx.phase = if snapshot.is_some() { InitPhase::Float } else { InitPhase::Junction };
    }
}

/// Standalone operating-point analysis.
#[derive(Debug, Default)]
pub struct OpAnalysis;

impl OpAnalysis {
    pub fn new() -> Self {
        Self
    }
}

impl Analysis for OpAnalysis {
    fn name(&self) -> &'static str {
        "op"
    }

    fn run(&mut self, circuit: &mut Circuit, sink: &mut dyn OutputSink, pause: &PauseFlag) -> Result<RunStatus> {
        let _span = tracing::info_span!("op_analysis").entered();
        if pause.take() {
            return Ok(RunStatus::Paused);
        }
        operating_point(circuit, AnalysisMode::DcOp)?;
        let plot = begin_solution_plot(circuit, sink, "op", "Operating point", "point", false);
        dump_solution(circuit, sink, plot, 0.0);
        Ok(RunStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Recorder;
    use crate::device::diode::Diode;
    use crate::device::resistor::Resistor;
    use crate::device::vsource::VoltageSource;
    use crate::options::SimOptions;
    use approx::assert_abs_diff_eq;

    fn diode_circuit(options: SimOptions) -> Circuit {
        let mut ckt = Circuit::new(options);
        let mut v = VoltageSource::new("vsrc");
        v.add("v1", "in", "0", 5.0);
        let mut r = Resistor::new("res");
        r.add("r1", "in", "a", 1e3);
        let mut d = Diode::new("dmod");
        d.add("d1", "a", "0");
        ckt.add(v).unwrap();
        ckt.add(r).unwrap();
        ckt.add(d).unwrap();
        ckt
    }

    #[test]
    fn op_emits_one_point() {
        let mut ckt = diode_circuit(SimOptions::default());
        let mut rec = Recorder::new();
        let status = OpAnalysis::new().run(&mut ckt, &mut rec, &PauseFlag::new()).unwrap();
        assert_eq!(status, RunStatus::Completed);
        let plot = rec.last().unwrap();
        assert_eq!(plot.len(), 1);
        let va = plot.real_vector("V(a)").unwrap()[0];
        assert!(va > 0.6 && va < 0.8, "V(a) = {va}");
    }

    #[test]
    fn gmin_stepping_reaches_direct_solution() {
        let mut direct = diode_circuit(SimOptions::default());
        operating_point(&mut direct, AnalysisMode::DcOp).unwrap();
        let expected = direct.node_voltage("a").unwrap();

        let mut stepped = diode_circuit(SimOptions::default());
        stepped.setup().unwrap();
        gmin_stepping(&mut stepped).unwrap();
        assert_abs_diff_eq!(stepped.node_voltage("a").unwrap(), expected, epsilon = 1e-6);
        assert_eq!(stepped.ctx.diag_gmin, 0.0);
    }

    #[test]
    fn source_stepping_reaches_direct_solution() {
        let mut direct = diode_circuit(SimOptions::default());
        operating_point(&mut direct, AnalysisMode::DcOp).unwrap();
        let expected = direct.node_voltage("a").unwrap();

        let mut stepped = diode_circuit(SimOptions::default());
        stepped.setup().unwrap();
        source_stepping(&mut stepped).unwrap();
        assert_abs_diff_eq!(stepped.node_voltage("a").unwrap(), expected, epsilon = 1e-6);
    }

    #[test]
    fn starved_iteration_limit_falls_back_to_stepping() {
        let opts = SimOptions {
            itl1: 8,
            ..SimOptions::default()
        };
        let mut ckt = diode_circuit(opts);
        operating_point(&mut ckt, AnalysisMode::DcOp).unwrap();
        let va = ckt.node_voltage("a").unwrap();
        assert!(va > 0.6 && va < 0.8, "V(a) = {va}");
    }
}
