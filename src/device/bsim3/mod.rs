//! BSIM3v3-class MOSFET.
//!
//! Each instance has four external terminals (drain, gate, source, bulk)
//! and, when the diffusion sheet resistance is non-zero, internal
//! drain-prime and source-prime nodes. The intrinsic device is evaluated
//! in the n-type forward frame; when `vds < 0` the drain and source roles
//! are exchanged and the resulting stamps are permuted back, so forward
//! and reverse operation share one code path.

mod check;
pub mod eval;
pub mod params;
pub mod temp;

use self::eval::{ChargeEval, DcEval};
use self::params::{InstanceParams, ModelParams};
use self::temp::SizeParams;
use super::limit::{critical_voltage, fetlim, limvds, pnjlim};
use super::{bad_param, no_instance, Device, DeviceKind, PairStamp, Setup};
use crate::context::{AnalysisMode, InitPhase, SimContext};
use crate::error::{NodalError, Result};
use crate::matrix::{MatrixHandle, SparseMatrix};
use crate::options::SimOptions;
use crate::report::{Reporter, Severity};
use num_complex::Complex64;
use tracing::debug;

/// Permittivity of silicon dioxide (F/m).
pub const EPSOX: f64 = 3.453_133e-11;
/// Permittivity of silicon (F/m).
pub const EPSSI: f64 = 1.035_94e-10;
pub(crate) const EXP_THRESHOLD: f64 = 34.0;
pub(crate) const MAX_EXP: f64 = 5.834_617_425e14;

// Terminal order used by every 4x4 array.
const DP: usize = 0;
const GATE: usize = 1;
const SP: usize = 2;
const BULK: usize = 3;
const FORWARD: [usize; 4] = [DP, GATE, SP, BULK];
const REVERSE: [usize; 4] = [SP, GATE, DP, BULK];

// State slots per instance.
const VBD: usize = 0;
const VBS: usize = 1;
const VGS: usize = 2;
const VDS: usize = 3;
const QG: usize = 4;
const QD: usize = 6;
const QB: usize = 8;
const NUM_STATES: usize = 10;

/// Linearization of one instance at its last evaluated bias, in the
/// n-type frame with the source-prime node as reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpPoint {
    /// Terminal voltages `[dp, g, sp, b]` the model was evaluated at.
    pub v0: [f64; 4],
    /// Static currents into each terminal.
    pub current: [f64; 4],
    /// Static conductance Jacobian.
    pub gjac: [[f64; 4]; 4],
    /// Terminal capacitance matrix.
    pub cap: [[f64; 4]; 4],
    /// `1` forward, `-1` with drain and source exchanged.
    pub mode: i8,
    pub vth: f64,
    pub vdsat: f64,
    pub ids: f64,
    pub gm: f64,
    pub gds: f64,
    pub gmbs: f64,
}

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    terminals: [String; 4],
    params: InstanceParams,
    /// External drain and source nodes.
    drain: usize,
    source: usize,
    /// `[dp, g, sp, b]`.
    nodes: [usize; 4],
    handles: [[MatrixHandle; 4]; 4],
    drain_res: Option<(PairStamp, f64)>,
    source_res: Option<(PairStamp, f64)>,
    state: usize,
    size: SizeParams,
    /// Threshold voltage used to limit gate steps.
    von: f64,
    op: OpPoint,
}

#[derive(Debug, Clone)]
pub struct Bsim3 {
    name: String,
    pub model: ModelParams,
    instances: Vec<Instance>,
    advised: bool,
    gmin: f64,
}

impl Bsim3 {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: ModelParams::default(),
            instances: Vec::new(),
            advised: false,
            gmin: 1e-12,
        }
    }

    pub fn add(&mut self, name: &str, drain: &str, gate: &str, source: &str, bulk: &str) -> &mut Self {
        self.instances.push(Instance {
            name: name.to_string(),
            terminals: [drain, gate, source, bulk].map(str::to_string),
            params: InstanceParams::default(),
            drain: 0,
            source: 0,
            nodes: [0; 4],
            handles: [[MatrixHandle::GROUND; 4]; 4],
            drain_res: None,
            source_res: None,
            state: 0,
            size: SizeParams::default(),
            von: 0.0,
            op: OpPoint::default(),
        });
        self
    }

    /// Operating point of `instance` from the last load.
    pub fn op_point(&self, instance: &str) -> Option<&OpPoint> {
        self.instances.iter().find(|i| i.name == instance).map(|i| &i.op)
    }

    /// Bias for this iteration as n-type `(vbs, vgs, vds)` plus whether
    /// any limiting took place.
    fn bias(&self, inst: &Instance, ctx: &SimContext) -> (f64, f64, f64, bool) {
        let t = self.model.typ;
        let s = inst.state;
        let off = inst.params.off;
        let phase = ctx.phase;
        match phase {
            InitPhase::SmallSignal => {
                let s0 = &ctx.state0;
                return (s0[s + VBS], s0[s + VGS], s0[s + VDS], false);
            }
            InitPhase::Transient => {
                let s1 = ctx.state(1);
                return (s1[s + VBS], s1[s + VGS], s1[s + VDS], false);
            }
            InitPhase::Junction if ctx.mode == AnalysisMode::TranOp && ctx.uic => {
                let p = &inst.params;
                return (
                    t * p.icvbs.unwrap_or(0.0),
                    t * p.icvgs.unwrap_or(0.0),
                    t * p.icvds.unwrap_or(0.0),
                    false,
                );
            }
            InitPhase::Junction if !off => {
                return (0.0, t * self.model.vth0() + 0.1, 0.1, false);
            }
            InitPhase::Junction | InitPhase::Fix if off => return (0.0, 0.0, 0.0, false),
            _ => {}
        }

        let (vbs, vgs, vds) = if phase == InitPhase::Predict {
            (ctx.predict(s + VBS), ctx.predict(s + VGS), ctx.predict(s + VDS))
        } else {
            let [dp, g, sp, b] = inst.nodes;
            let v = |n: usize| ctx.voltage(n);
            (t * (v(b) - v(sp)), t * (v(g) - v(sp)), t * (v(dp) - v(sp)))
        };

        let s0 = &ctx.state0;
        let (old_vgs, old_vds, old_vbs, old_vbd) = (s0[s + VGS], s0[s + VDS], s0[s + VBS], s0[s + VBD]);
        let mut vgs = vgs;
        let mut vds = vds;
        let vgd = vgs - vds;
        let old_vgd = old_vgs - old_vds;
        if old_vds >= 0.0 {
            vgs = fetlim(vgs, old_vgs, inst.von);
            vds = limvds(vgs - vgd, old_vds);
        } else {
            let vgd = fetlim(vgd, old_vgd, inst.von);
            vds = -limvds(-(vgs - vgd), -old_vds);
            vgs = vgd + vds;
        }

        let vtm = inst.size.vtm;
        let vcrit = critical_voltage(vtm, 1e-14);
        let (vbs, limited) = if vds >= 0.0 {
            pnjlim(vbs, old_vbs, vtm, vcrit)
        } else {
            let (vbd, limited) = pnjlim(vbs - vds, old_vbd, vtm, vcrit);
            (vbd + vds, limited)
        };
        (vbs, vgs, vds, limited)
    }

    /// Static currents, conductances and capacitances at `(vbs, vgs, vds)`.
    fn linearize(&self, inst: &Instance, vbs: f64, vgs: f64, vds: f64) -> (OpPoint, [f64; 4]) {
        let m = &self.model;
        let p = &inst.size;
        let vbd = vbs - vds;
        let vgd = vgs - vds;
        let (mode, perm, e_vgs, e_vds, e_vbs) = if vds >= 0.0 {
            (1, FORWARD, vgs, vds, vbs)
        } else {
            (-1, REVERSE, vgd, -vds, vbd)
        };

        let dc: DcEval = eval::dc(p, m, e_vgs, e_vds, e_vbs);
        let q: ChargeEval = eval::charge(p, &dc, e_vgs, e_vds);

        let mut op = OpPoint {
            v0: [vds, vgs, 0.0, vbs],
            mode,
            vth: dc.vth,
            vdsat: dc.vdsat,
            ids: dc.ids,
            gm: dc.gm,
            gds: dc.gds,
            gmbs: dc.gmbs,
            ..OpPoint::default()
        };

        // Channel current enters the frame drain and leaves the frame source.
        let row = [dc.gds, dc.gm, -(dc.gm + dc.gds + dc.gmbs), dc.gmbs];
        op.current[perm[DP]] += dc.ids;
        op.current[perm[SP]] -= dc.ids;
        for (j, &g) in row.iter().enumerate() {
            op.gjac[perm[DP]][perm[j]] += g;
            op.gjac[perm[SP]][perm[j]] -= g;
        }

        // Intrinsic charges in the frame: rows g, d, b; columns vgs, vds, vbs.
        let mut charges = [0.0; 4];
        let frame_rows = [(GATE, q.qg, 0), (DP, q.qd, 1), (BULK, q.qb, 2)];
        for &(term, value, r) in &frame_rows {
            let c = q.caps[r];
            let terminal_row = [c[1], c[0], -(c[0] + c[1] + c[2]), c[2]];
            charges[perm[term]] += value;
            charges[perm[SP]] -= value;
            for j in 0..4 {
                op.cap[perm[term]][perm[j]] += terminal_row[j];
                op.cap[perm[SP]][perm[j]] -= terminal_row[j];
            }
        }

        // Overlap capacitances.
        let overlaps = [
            (SP, m.cgso * p.weff_cv, vgs),
            (DP, m.cgdo * p.weff_cv, vgd),
            (BULK, m.cgbo * p.leff_cv, vgs - vbs),
        ];
        for &(other, c, v) in &overlaps {
            charges[GATE] += c * v;
            charges[other] -= c * v;
            add_pair(&mut op.cap, GATE, other, c);
        }

        // Bulk junctions.
        let junctions = [
            (SP, vbs, p.source_sat_current, inst.params.as_, inst.params.ps),
            (DP, vbd, p.drain_sat_current, inst.params.ad, inst.params.pd),
        ];
        for &(other, v, isat, area, perim) in &junctions {
            let (i, g) = junction_current(isat, v, p.vtm, self.gmin);
            op.current[BULK] += i;
            op.current[other] -= i;
            add_pair(&mut op.gjac, BULK, other, g);

            let (qj, cj) = junction_charge(m, area, perim, v);
            charges[BULK] += qj;
            charges[other] -= qj;
            add_pair(&mut op.cap, BULK, other, cj);
        }

        (op, charges)
    }
}

/// Two-terminal element between `a` and `b` in a 4x4 terminal matrix.
fn add_pair(mat: &mut [[f64; 4]; 4], a: usize, b: usize, value: f64) {
    mat[a][a] += value;
    mat[b][b] += value;
    mat[a][b] -= value;
    mat[b][a] -= value;
}

/// Bulk junction current and conductance with forward voltage `v`.
fn junction_current(isat: f64, v: f64, vtm: f64, gmin: f64) -> (f64, f64) {
    if isat <= 0.0 {
        return (gmin * v, gmin);
    }
    let ev = (v / vtm).min(EXP_THRESHOLD).exp();
    (isat * (ev - 1.0) + gmin * v, isat * ev / vtm + gmin)
}

/// Depletion charge and capacitance of a junction with bottom `area` and
/// sidewall `perim`.
fn junction_charge(m: &ModelParams, area: f64, perim: f64, v: f64) -> (f64, f64) {
    let czb = m.cj * area;
    let czsw = m.cjsw * perim;
    if v < 0.0 {
        let arg = 1.0 - v / m.pb;
        let sarg = arg.powf(-m.mj);
        let argsw = 1.0 - v / m.pbsw;
        let sargsw = argsw.powf(-m.mjsw);
        let q = m.pb * czb * (1.0 - arg * sarg) / (1.0 - m.mj)
            + m.pbsw * czsw * (1.0 - argsw * sargsw) / (1.0 - m.mjsw);
        (q, czb * sarg + czsw * sargsw)
    } else {
        let q = v * (czb + czsw) + v * v * (czb * m.mj * 0.5 / m.pb + czsw * m.mjsw * 0.5 / m.pbsw);
        (q, czb + czsw + v * (czb * m.mj / m.pb + czsw * m.mjsw / m.pbsw))
    }
}

fn mat_vec(mat: &[[f64; 4]; 4], v: &[f64; 4]) -> [f64; 4] {
    std::array::from_fn(|i| (0..4).map(|j| mat[i][j] * v[j]).sum())
}

impl Device for Bsim3 {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Bsim3
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn instance_names(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name.as_str()).collect()
    }

    fn set_model_param(&mut self, param: &str, value: f64) -> Result<()> {
        if self.model.set(param, value) {
            Ok(())
        } else {
            Err(bad_param(&self.name, param))
        }
    }

    fn set_instance_param(&mut self, instance: &str, param: &str, value: f64) -> Result<()> {
        let inst = self
            .instances
            .iter_mut()
            .find(|i| i.name == instance)
            .ok_or_else(|| no_instance(&self.name, instance))?;
        if inst.params.set(param, value) {
            Ok(())
        } else {
            Err(bad_param(instance, param))
        }
    }

    fn setup(&mut self, setup: &mut Setup<'_>) -> Result<()> {
        let rsh = self.model.rsh;
        for inst in &mut self.instances {
            let [d, g, s, b] = [0, 1, 2, 3].map(|k| setup.node(&inst.terminals[k]));
            let rd = rsh * inst.params.nrd;
            let rs = rsh * inst.params.nrs;
            let dp = if rd > 0.0 { setup.internal_node(&inst.name, "drain") } else { d };
            let sp = if rs > 0.0 { setup.internal_node(&inst.name, "source") } else { s };
            inst.drain = d;
            inst.source = s;
            inst.nodes = [dp, g, sp, b];
            inst.drain_res = (rd > 0.0).then(|| (PairStamp::new(setup, d, dp), 1.0 / rd));
            inst.source_res = (rs > 0.0).then(|| (PairStamp::new(setup, s, sp), 1.0 / rs));
            for i in 0..4 {
                for j in 0..4 {
                    inst.handles[i][j] = setup.allocate(inst.nodes[i], inst.nodes[j]);
                }
            }
            inst.state = setup.states(NUM_STATES);
        }
        Ok(())
    }

    fn temperature(&mut self, options: &SimOptions) -> Result<()> {
        let tnom = self.model.tnom.unwrap_or(options.tnom);
        self.gmin = options.gmin;
        for inst in &mut self.instances {
            inst.size = SizeParams::compute(&self.model, &inst.params, options.temp, tnom);
            inst.von = self.model.typ * self.model.vth0();
        }
        Ok(())
    }

    fn check_model(&mut self, reporter: &mut dyn Reporter) -> Result<()> {
        let sizes: Vec<(&str, &SizeParams)> =
            self.instances.iter().map(|i| (i.name.as_str(), &i.size)).collect();
        let reasons = check::fatal_reasons(&self.model, &sizes);
        if !reasons.is_empty() {
            for reason in &reasons {
                reporter.report(Severity::Fatal, &self.name, reason);
            }
            return Err(NodalError::ParameterFatal {
                device: self.name.clone(),
                reason: reasons.join("; "),
            });
        }
        if !self.advised {
            check::advise(&self.model, &sizes, &self.name, reporter);
            self.advised = true;
        }
        check::clamp(&mut self.model, &self.name, reporter);
        Ok(())
    }

    fn load(&mut self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        let t = self.model.typ;
        let transient = ctx.mode == AnalysisMode::Transient;

        for idx in 0..self.instances.len() {
            let inst = &self.instances[idx];
            let s = inst.state;
            let (vbs, vgs, vds, limited) = self.bias(inst, ctx);
            if limited && !(ctx.phase == InitPhase::Fix && inst.params.off) {
                ctx.noncon += 1;
            }
            let (op, charges) = self.linearize(inst, vbs, vgs, vds);

            ctx.state0[s + VBS] = vbs;
            ctx.state0[s + VGS] = vgs;
            ctx.state0[s + VDS] = vds;
            ctx.state0[s + VBD] = vbs - vds;
            for (slot, term) in [(QG, GATE), (QD, DP), (QB, BULK)] {
                ctx.state0[s + slot] = t * charges[term];
            }

            let inst = &mut self.instances[idx];
            inst.von = op.vth;
            inst.op = op;
            if ctx.phase == InitPhase::SmallSignal {
                continue;
            }

            let mut jac = op.gjac;
            let mut eq: [f64; 4] = {
                let jv = mat_vec(&op.gjac, &op.v0);
                std::array::from_fn(|k| op.current[k] - jv[k])
            };

            if transient {
                let ag0 = ctx.ag[0];
                let mut cap_current = [0.0; 4];
                for (slot, term) in [(QG, GATE), (QD, DP), (QB, BULK)] {
                    if ctx.phase == InitPhase::Transient {
                        let q0 = ctx.state0[s + slot];
                        ctx.state1_mut()[s + slot] = q0;
                    }
                    ctx.integrate(s + slot, 0.0);
                    if ctx.phase == InitPhase::Transient {
                        let i0 = ctx.state0[s + slot + 1];
                        ctx.state1_mut()[s + slot + 1] = i0;
                    }
                    cap_current[term] = t * ctx.state0[s + slot + 1];
                }
                cap_current[SP] = -(cap_current[GATE] + cap_current[DP] + cap_current[BULK]);
                let cv = mat_vec(&op.cap, &op.v0);
                for i in 0..4 {
                    eq[i] += cap_current[i] - ag0 * cv[i];
                    for j in 0..4 {
                        jac[i][j] += ag0 * op.cap[i][j];
                    }
                }
            }

            for i in 0..4 {
                ctx.rhs[inst.nodes[i]] -= t * eq[i];
                for j in 0..4 {
                    matrix.add(inst.handles[i][j], jac[i][j]);
                }
            }
            if let Some((stamp, g)) = &inst.drain_res {
                stamp.add(matrix, *g);
            }
            if let Some((stamp, g)) = &inst.source_res {
                stamp.add(matrix, *g);
            }
        }
        Ok(())
    }

    fn ac_load(&self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        self.pz_load(Complex64::new(0.0, ctx.omega), matrix)
    }

    fn pz_load(&self, s: Complex64, matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            for i in 0..4 {
                for j in 0..4 {
                    let y = inst.op.gjac[i][j] + s * inst.op.cap[i][j];
                    matrix.add_complex(inst.handles[i][j], y);
                }
            }
            for (stamp, g) in [&inst.drain_res, &inst.source_res].into_iter().flatten() {
                stamp.add_complex(matrix, Complex64::new(*g, 0.0));
            }
        }
        Ok(())
    }

    fn conv_test(&self, ctx: &mut SimContext) -> bool {
        let t = self.model.typ;
        for inst in &self.instances {
            let sp = ctx.voltage(inst.nodes[SP]);
            let v: [f64; 4] = inst.nodes.map(|n| t * (ctx.voltage(n) - sp));
            let op = &inst.op;
            let delta: [f64; 4] = std::array::from_fn(|k| v[k] - op.v0[k]);
            let step = mat_vec(&op.gjac, &delta);
            for row in [DP, BULK] {
                let actual = op.current[row];
                let hat = actual + step[row];
                let tol = ctx.options.reltol * hat.abs().max(actual.abs()) + ctx.options.abstol;
                if (hat - actual).abs() >= tol {
                    debug!(instance = %inst.name, row, hat, actual, "bsim3 not converged");
                    ctx.noncon += 1;
                    return false;
                }
            }
        }
        true
    }

    fn get_ic(&mut self, ctx: &SimContext) {
        for inst in &mut self.instances {
            let [d, g, s, b] = [inst.drain, inst.nodes[GATE], inst.source, inst.nodes[BULK]].map(|n| ctx.voltage(n));
            let p = &mut inst.params;
            p.icvds.get_or_insert(d - s);
            p.icvgs.get_or_insert(g - s);
            p.icvbs.get_or_insert(b - s);
        }
    }

    fn trunc(&self, ctx: &SimContext, step: &mut f64) {
        for inst in &self.instances {
            for slot in [QG, QD, QB] {
                *step = step.min(ctx.truncation_step(inst.state + slot));
            }
        }
    }
}
