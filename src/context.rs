//! Simulation context passed into every device call.
//!
//! Holds the solution vectors, the device state vector and its accepted
//! history, the analysis mode and initialization phase, integration
//! coefficients and the non-convergence counter. Analysis drivers and the
//! Newton driver mutate it; devices read it and append to `rhs`,
//! `state0` and `noncon`.

use crate::history::TimeList;
use crate::options::{IntegrationMethod, SimOptions};
use crate::stats::Stats;
use num_complex::Complex64;

/// Which analysis is driving the device loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Standalone DC operating point.
    DcOp,
    /// Operating point that seeds a transient run.
    TranOp,
    /// One point of a DC transfer sweep.
    DcSweep,
    Transient,
    Ac,
    PoleZero,
}

impl AnalysisMode {
    /// Reactive elements are open (capacitors) or shorted (inductors).
    pub fn is_dc(self) -> bool {
        matches!(self, AnalysisMode::DcOp | AnalysisMode::TranOp | AnalysisMode::DcSweep)
    }
}

/// Newton initialization phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// Junctions start at their critical voltages.
    Junction,
    /// Devices flagged `off` are held off for one more round.
    Fix,
    /// Normal iteration from the previous iterate.
    Float,
    /// First time point of a transient run.
    Transient,
    /// Later time points: device voltages are extrapolated from history.
    Predict,
    /// Operating point is final; devices record small-signal parameters.
    SmallSignal,
}

/// Whether an unknown is a node voltage or a branch current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKind {
    Voltage,
    Current,
}

/// Truncation-error factors of the trapezoidal rule, by order.
const TRAP_COEFF: [f64; 2] = [0.5, 1.0 / 12.0];
/// Truncation-error factor of backward Euler.
const EULER_COEFF: f64 = 0.5;

#[derive(Debug)]
pub struct SimContext {
    pub options: SimOptions,
    pub mode: AnalysisMode,
    pub phase: InitPhase,
    /// Use initial conditions instead of an operating point.
    pub uic: bool,
    /// Right-hand side under assembly; holds the new iterate after a solve.
    pub rhs: Vec<f64>,
    /// Previous iterate. Devices read terminal voltages from here.
    pub rhs_old: Vec<f64>,
    /// Complex excitation for AC and pole-zero solves.
    pub ac_rhs: Vec<Complex64>,
    /// Device state at the point being solved.
    pub state0: Vec<f64>,
    /// Accepted states, newest first.
    pub history: TimeList<Vec<f64>>,
    pub time: f64,
    /// Step from the last accepted point to `time`.
    pub delta: f64,
    pub order: usize,
    pub method: IntegrationMethod,
    /// Integration coefficients; `ag[0]` multiplies the present charge.
    pub ag: [f64; 2],
    pub omega: f64,
    /// Independent source scale factor for source stepping.
    pub src_fact: f64,
    /// Extra conductance to ground on every node during gmin stepping.
    pub diag_gmin: f64,
    /// Non-convergence count for the current iteration.
    pub noncon: usize,
    pub stats: Stats,
    kinds: Vec<UnknownKind>,
}

impl SimContext {
    pub fn new(options: SimOptions) -> Self {
        let method = options.method;
        Self {
            options,
            mode: AnalysisMode::DcOp,
            phase: InitPhase::Junction,
            uic: false,
            rhs: vec![0.0],
            rhs_old: vec![0.0],
            ac_rhs: vec![Complex64::new(0.0, 0.0)],
            state0: Vec::new(),
            history: TimeList::new(),
            time: 0.0,
            delta: 0.0,
            order: 1,
            method,
            ag: [0.0; 2],
            omega: 0.0,
            src_fact: 1.0,
            diag_gmin: 0.0,
            noncon: 0,
            stats: Stats::new(),
            kinds: vec![UnknownKind::Voltage],
        }
    }

    /// Size the vectors for the elaborated circuit. `kinds[0]` is ground.
    pub fn allocate(&mut self, kinds: Vec<UnknownKind>, num_states: usize) {
        let n = kinds.len();
        self.kinds = kinds;
        self.rhs = vec![0.0; n];
        self.rhs_old = vec![0.0; n];
        self.ac_rhs = vec![Complex64::new(0.0, 0.0); n];
        self.state0 = vec![0.0; num_states];
        self.history.clear();
    }

    /// Number of unknowns, ground excluded.
    pub fn num_unknowns(&self) -> usize {
        self.kinds.len() - 1
    }

    pub fn unknown_kind(&self, index: usize) -> UnknownKind {
        self.kinds[index]
    }

    /// Voltage of `node` in the previous iterate.
    #[inline]
    pub fn voltage(&self, node: usize) -> f64 {
        self.rhs_old[node]
    }

    /// State vector of the `k`-th point back: `0` is the point being
    /// solved, `1` the last accepted point. Falls back to the oldest
    /// available vector when the history is shorter.
    pub fn state(&self, k: usize) -> &[f64] {
        if k == 0 {
            return &self.state0;
        }
        match self.history.nth(k - 1) {
            Some((_, s)) => s,
            None => self
                .history
                .tail()
                .map(|(_, s)| s.as_slice())
                .unwrap_or(&self.state0),
        }
    }

    /// Mutable last accepted state, used on the first transient step to
    /// seed the companion-model history.
    pub fn state1_mut(&mut self) -> &mut [f64] {
        match self.history.head_mut() {
            Some(s) => s,
            None => &mut self.state0,
        }
    }

    /// Linear extrapolation of state slot `slot` to the present time point.
    pub fn predict(&self, slot: usize) -> f64 {
        let s1 = self.state(1)[slot];
        let s2 = self.state(2)[slot];
        let xfact = match self.delta_old(1) {
            Some(d) if d > 0.0 => self.delta / d,
            _ => 0.0,
        };
        (1.0 + xfact) * s1 - xfact * s2
    }

    /// `i`-th past step: `0` is the current step, `1` the step that
    /// produced the last accepted point.
    pub fn delta_old(&self, i: usize) -> Option<f64> {
        if i == 0 {
            return Some(self.delta);
        }
        let mut times = self.history.iter().map(|(t, _)| t).skip(i - 1);
        let newer = times.next()?;
        let older = times.next()?;
        Some(newer - older)
    }

    /// Set `ag` for the current method, order and step.
    pub fn compute_coefficients(&mut self) {
        let h = self.delta;
        self.ag = match (self.method, self.order) {
            (IntegrationMethod::Trap, 2) => [2.0 / h, 1.0],
            _ => [1.0 / h, -1.0 / h],
        };
    }

    /// Companion model of a charge stored at `state0[qcap]`.
    ///
    /// Writes the capacitor current into `state0[qcap + 1]` and returns
    /// `(geq, ceq)` such that the branch current is `geq * v + ceq`.
    pub fn integrate(&mut self, qcap: usize, cap: f64) -> (f64, f64) {
        let q0 = self.state0[qcap];
        let (q1, i1) = {
            let s1 = self.state(1);
            (s1[qcap], s1[qcap + 1])
        };
        let current = match (self.method, self.order) {
            (IntegrationMethod::Trap, 2) => -i1 * self.ag[1] + self.ag[0] * (q0 - q1),
            _ => self.ag[0] * (q0 - q1),
        };
        self.state0[qcap + 1] = current;
        (self.ag[0] * cap, current - self.ag[0] * q0)
    }

    /// Largest step the local truncation error of the charge at
    /// `state0[qcap]` allows, or infinity when the history is too short.
    pub fn truncation_step(&self, qcap: usize) -> f64 {
        let order = self.order;
        let points = order + 2;
        let mut diff = Vec::with_capacity(points);
        diff.push(self.state0[qcap]);
        diff.extend(self.history.iter().take(points - 1).map(|(_, s)| s[qcap]));
        if diff.len() < points {
            return f64::INFINITY;
        }
        let delta_old: Option<Vec<f64>> = (0..=order).map(|i| self.delta_old(i)).collect();
        let Some(delta_old) = delta_old else {
            return f64::INFINITY;
        };

        let s1 = self.state(1);
        let opts = &self.options;
        let volttol = opts.abstol
            + opts.reltol * self.state0[qcap + 1].abs().max(s1[qcap + 1].abs());
        let chargetol = opts.reltol
            * self.state0[qcap].abs().max(s1[qcap].abs()).max(opts.chgtol)
            / self.delta;
        let tol = volttol.max(chargetol);

        // Divided differences over `order + 2` points.
        let mut span = delta_old.clone();
        let mut j = order as isize;
        loop {
            for i in 0..=(j as usize) {
                diff[i] = (diff[i] - diff[i + 1]) / span[i];
            }
            j -= 1;
            if j < 0 {
                break;
            }
            for i in 0..=(j as usize) {
                span[i] = span[i + 1] + delta_old[i];
            }
        }

        let factor = match self.method {
            IntegrationMethod::Trap => TRAP_COEFF[order.clamp(1, 2) - 1],
            IntegrationMethod::Euler => EULER_COEFF,
        };
        let del = opts.trtol * tol / opts.abstol.max(factor * diff[0].abs());
        match order {
            1 => del,
            2 => del.sqrt(),
            n => (del.ln() / n as f64).exp(),
        }
    }
}
