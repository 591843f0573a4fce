//! Junction diode with series resistance and junction/diffusion charge.

use super::limit::{critical_voltage, pnjlim};
use super::{bad_param, no_instance, thermal_voltage, Device, DeviceKind, PairStamp, Setup};
use crate::context::{AnalysisMode, InitPhase, SimContext};
use crate::error::{NodalError, Result};
use crate::matrix::SparseMatrix;
use crate::options::SimOptions;
use crate::report::{Reporter, Severity};
use num_complex::Complex64;

// State slots per instance.
const VOLTAGE: usize = 0;
const CURRENT: usize = 1;
const CONDUCT: usize = 2;
const CHARGE: usize = 3;
const NUM_STATES: usize = 5;

#[derive(Debug, Clone)]
pub struct DiodeParams {
    /// Saturation current (A).
    pub is: f64,
    /// Emission coefficient.
    pub n: f64,
    /// Ohmic resistance (Ω).
    pub rs: f64,
    /// Zero-bias junction capacitance (F).
    pub cjo: f64,
    /// Junction potential (V).
    pub vj: f64,
    /// Grading coefficient.
    pub m: f64,
    /// Transit time (s).
    pub tt: f64,
    /// Forward-bias depletion capacitance coefficient.
    pub fc: f64,
    /// Activation energy (eV).
    pub eg: f64,
    /// Saturation current temperature exponent.
    pub xti: f64,
    pub tnom: Option<f64>,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self {
            is: 1e-14,
            n: 1.0,
            rs: 0.0,
            cjo: 0.0,
            vj: 1.0,
            m: 0.5,
            tt: 0.0,
            fc: 0.5,
            eg: 1.11,
            xti: 3.0,
            tnom: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    terminals: [String; 2],
    area: f64,
    off: bool,
    ic: Option<f64>,
    pos: usize,
    pos_prime: usize,
    neg: usize,
    junction: Option<PairStamp>,
    series: Option<PairStamp>,
    state: usize,
    /// Small-signal conductance and capacitance from the last load.
    gd: f64,
    capd: f64,
}

/// Temperature-adjusted values shared by every instance.
#[derive(Debug, Clone, Copy, Default)]
struct Derived {
    vte: f64,
    is: f64,
    vj: f64,
    f1: f64,
    f2: f64,
    f3: f64,
    gmin: f64,
}

#[derive(Debug, Clone)]
pub struct Diode {
    name: String,
    pub params: DiodeParams,
    instances: Vec<Instance>,
    derived: Derived,
}

impl Diode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: DiodeParams::default(),
            instances: Vec::new(),
            derived: Derived::default(),
        }
    }

    pub fn add(&mut self, name: &str, anode: &str, cathode: &str) -> &mut Self {
        self.instances.push(Instance {
            name: name.to_string(),
            terminals: [anode.to_string(), cathode.to_string()],
            area: 1.0,
            off: false,
            ic: None,
            pos: 0,
            pos_prime: 0,
            neg: 0,
            junction: None,
            series: None,
            state: 0,
            gd: 0.0,
            capd: 0.0,
        });
        self
    }

    /// Junction current and conductance at `vd`.
    fn dc_current(&self, csat: f64, vd: f64) -> (f64, f64) {
        let Derived { vte, gmin, .. } = self.derived;
        if vd >= -3.0 * vte {
            let evd = (vd / vte).exp();
            (csat * (evd - 1.0) + gmin * vd, csat * evd / vte + gmin)
        } else {
            let arg = 3.0 * vte / (vd * std::f64::consts::E);
            let arg = arg * arg * arg;
            (-csat * (1.0 + arg) + gmin * vd, csat * 3.0 * arg / vd + gmin)
        }
    }

    /// Depletion plus diffusion charge and its capacitance.
    fn charge(&self, area: f64, vd: f64, cd: f64, gd: f64) -> (f64, f64) {
        let p = &self.params;
        let d = &self.derived;
        let czero = p.cjo * area;
        let depcap = p.fc * d.vj;
        if vd < depcap {
            let arg = 1.0 - vd / d.vj;
            let sarg = (-p.m * arg.ln()).exp();
            let q = p.tt * cd + d.vj * czero * (1.0 - arg * sarg) / (1.0 - p.m);
            (q, p.tt * gd + czero * sarg)
        } else {
            let czof2 = czero / d.f2;
            let q = p.tt * cd
                + czero * d.f1
                + czof2 * (d.f3 * (vd - depcap) + (p.m / (d.vj + d.vj)) * (vd * vd - depcap * depcap));
            (q, p.tt * gd + czof2 * (d.f3 + p.m * vd / d.vj))
        }
    }
}

impl Device for Diode {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Diode
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn instance_names(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name.as_str()).collect()
    }

    fn set_model_param(&mut self, param: &str, value: f64) -> Result<()> {
        let p = &mut self.params;
        match param {
            "is" => p.is = value,
            "n" => p.n = value,
            "rs" => p.rs = value,
            "cjo" | "cj0" => p.cjo = value,
            "vj" => p.vj = value,
            "m" => p.m = value,
            "tt" => p.tt = value,
            "fc" => p.fc = value,
            "eg" => p.eg = value,
            "xti" => p.xti = value,
            "tnom" => p.tnom = Some(value),
            _ => return Err(bad_param(&self.name, param)),
        }
        Ok(())
    }

    fn set_instance_param(&mut self, instance: &str, param: &str, value: f64) -> Result<()> {
        let inst = self
            .instances
            .iter_mut()
            .find(|i| i.name == instance)
            .ok_or_else(|| no_instance(&self.name, instance))?;
        match param {
            "area" => inst.area = value,
            "off" => inst.off = value != 0.0,
            "ic" => inst.ic = Some(value),
            _ => return Err(bad_param(instance, param)),
        }
        Ok(())
    }

    fn setup(&mut self, setup: &mut Setup<'_>) -> Result<()> {
        let has_rs = self.params.rs != 0.0;
        for inst in &mut self.instances {
            inst.pos = setup.node(&inst.terminals[0]);
            inst.neg = setup.node(&inst.terminals[1]);
            inst.pos_prime = if has_rs {
                setup.internal_node(&inst.name, "internal")
            } else {
                inst.pos
            };
            inst.junction = Some(PairStamp::new(setup, inst.pos_prime, inst.neg));
            inst.series = has_rs.then(|| PairStamp::new(setup, inst.pos, inst.pos_prime));
            inst.state = setup.states(NUM_STATES);
        }
        Ok(())
    }

    fn temperature(&mut self, options: &SimOptions) -> Result<()> {
        let p = &self.params;
        let tnom = p.tnom.unwrap_or(options.tnom);
        let ratio = options.temp / tnom;
        let vt = thermal_voltage(options.temp);
        let vte = p.n * vt;
        let is = p.is
            * ratio.powf(p.xti / p.n)
            * ((ratio - 1.0) * p.eg / vte).exp();
        let vj = p.vj;
        self.derived = Derived {
            vte,
            is,
            vj,
            f1: vj * (1.0 - (1.0 - p.fc).powf(1.0 - p.m)) / (1.0 - p.m),
            f2: (1.0 - p.fc).powf(1.0 + p.m),
            f3: 1.0 - p.fc * (1.0 + p.m),
            gmin: options.gmin,
        };
        Ok(())
    }

    fn check_model(&mut self, reporter: &mut dyn Reporter) -> Result<()> {
        let p = &self.params;
        let fatal = if p.is <= 0.0 {
            Some(format!("IS = {} must be positive", p.is))
        } else if p.n <= 0.0 {
            Some(format!("N = {} must be positive", p.n))
        } else if p.rs < 0.0 {
            Some(format!("RS = {} is negative", p.rs))
        } else if p.vj <= 0.0 {
            Some(format!("VJ = {} must be positive", p.vj))
        } else if p.m >= 1.0 {
            Some(format!("M = {} must be below 1", p.m))
        } else {
            None
        };
        if let Some(reason) = fatal {
            reporter.report(Severity::Fatal, &self.name, &reason);
            return Err(NodalError::ParameterFatal { device: self.name.clone(), reason });
        }
        if self.params.fc > 0.95 {
            reporter.report(
                Severity::Warning,
                &self.name,
                &format!("FC = {} is too large. Set to 0.95.", self.params.fc),
            );
            self.params.fc = 0.95;
            let fc = self.params.fc;
            let m = self.params.m;
            self.derived.f1 = self.derived.vj * (1.0 - (1.0 - fc).powf(1.0 - m)) / (1.0 - m);
            self.derived.f2 = (1.0 - fc).powf(1.0 + m);
            self.derived.f3 = 1.0 - fc * (1.0 + m);
        }
        Ok(())
    }

    fn load(&mut self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        let vte = self.derived.vte;
        let needs_charge = matches!(ctx.mode, AnalysisMode::Transient)
            || ctx.phase == InitPhase::SmallSignal
            || (ctx.mode == AnalysisMode::TranOp && ctx.uic);

        for idx in 0..self.instances.len() {
            let inst = &self.instances[idx];
            let s = inst.state;
            let csat = self.derived.is * inst.area;
            let vcrit = critical_voltage(vte, csat);
            let mut limited = false;

            let vd = if ctx.phase == InitPhase::SmallSignal {
                ctx.state0[s + VOLTAGE]
            } else if ctx.phase == InitPhase::Transient {
                ctx.state(1)[s + VOLTAGE]
            } else if ctx.phase == InitPhase::Junction && ctx.mode == AnalysisMode::TranOp && ctx.uic {
                inst.ic.unwrap_or(0.0)
            } else if ctx.phase == InitPhase::Junction && inst.off {
                0.0
            } else if ctx.phase == InitPhase::Junction {
                vcrit
            } else if ctx.phase == InitPhase::Fix && inst.off {
                0.0
            } else {
                let vd = if ctx.phase == InitPhase::Predict {
                    ctx.predict(s + VOLTAGE)
                } else {
                    ctx.voltage(inst.pos_prime) - ctx.voltage(inst.neg)
                };
                let (vd, hit) = pnjlim(vd, ctx.state0[s + VOLTAGE], vte, vcrit);
                limited = hit;
                vd
            };

            let (mut cd, mut gd) = self.dc_current(csat, vd);
            let inst = &self.instances[idx];
            let mut capd = 0.0;

            if needs_charge {
                let (q, c) = self.charge(inst.area, vd, cd, gd);
                capd = c;
                ctx.state0[s + CHARGE] = q;
                if ctx.phase == InitPhase::SmallSignal {
                    ctx.state0[s + VOLTAGE] = vd;
                    let inst = &mut self.instances[idx];
                    inst.gd = gd;
                    inst.capd = capd;
                    continue;
                }
                if ctx.mode == AnalysisMode::Transient {
                    if ctx.phase == InitPhase::Transient {
                        ctx.state1_mut()[s + CHARGE] = q;
                    }
                    let (geq, _) = ctx.integrate(s + CHARGE, capd);
                    gd += geq;
                    cd += ctx.state0[s + CHARGE + 1];
                    if ctx.phase == InitPhase::Transient {
                        let iq = ctx.state0[s + CHARGE + 1];
                        ctx.state1_mut()[s + CHARGE + 1] = iq;
                    }
                }
            }

            if limited && !(ctx.phase == InitPhase::Fix && inst.off) {
                ctx.noncon += 1;
            }
            ctx.state0[s + VOLTAGE] = vd;
            ctx.state0[s + CURRENT] = cd;
            ctx.state0[s + CONDUCT] = gd;

            let cdeq = cd - gd * vd;
            ctx.rhs[inst.neg] += cdeq;
            ctx.rhs[inst.pos_prime] -= cdeq;
            if let Some(j) = &inst.junction {
                j.add(matrix, gd);
            }
            if let Some(series) = &inst.series {
                series.add(matrix, inst.area / self.params.rs);
            }
            let inst = &mut self.instances[idx];
            inst.gd = gd;
            inst.capd = capd;
        }
        Ok(())
    }

    fn ac_load(&self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        self.pz_load(Complex64::new(0.0, ctx.omega), matrix)
    }

    fn pz_load(&self, s: Complex64, matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            if let Some(j) = &inst.junction {
                j.add_complex(matrix, inst.gd + s * inst.capd);
            }
            if let Some(series) = &inst.series {
                series.add_complex(matrix, Complex64::new(inst.area / self.params.rs, 0.0));
            }
        }
        Ok(())
    }

    fn conv_test(&self, ctx: &mut SimContext) -> bool {
        let opts = &ctx.options;
        for inst in &self.instances {
            let s = inst.state;
            let vd = ctx.voltage(inst.pos_prime) - ctx.voltage(inst.neg);
            let delvd = vd - ctx.state0[s + VOLTAGE];
            let cd = ctx.state0[s + CURRENT];
            let cdhat = cd + ctx.state0[s + CONDUCT] * delvd;
            let tol = opts.reltol * cdhat.abs().max(cd.abs()) + opts.abstol;
            if (cdhat - cd).abs() > tol {
                ctx.noncon += 1;
                return false;
            }
        }
        true
    }

    fn get_ic(&mut self, ctx: &SimContext) {
        for inst in &mut self.instances {
            if inst.ic.is_none() {
                inst.ic = Some(ctx.voltage(inst.pos) - ctx.voltage(inst.neg));
            }
        }
    }

    fn trunc(&self, ctx: &SimContext, step: &mut f64) {
        for inst in &self.instances {
            *step = step.min(ctx.truncation_step(inst.state + CHARGE));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diode() -> Diode {
        let mut d = Diode::new("dmod");
        d.add("D1", "a", "0");
        d.temperature(&SimOptions::default()).unwrap();
        d
    }

    #[test]
    fn forward_current_follows_exponential() {
        let d = diode();
        let vte = d.derived.vte;
        let (cd, gd) = d.dc_current(1e-14, 0.6);
        let expected = 1e-14 * ((0.6 / vte).exp() - 1.0);
        assert!((cd - expected).abs() < 1e-9 * expected + 1e-12);
        assert!((gd - 1e-14 * (0.6 / vte).exp() / vte).abs() / gd < 1e-6);
    }

    #[test]
    fn reverse_current_saturates() {
        let d = diode();
        let (cd, gd) = d.dc_current(1e-14, -5.0);
        assert!(cd < 0.0 && cd > -2e-14);
        assert!(gd > 0.0);
    }

    #[test]
    fn depletion_charge_is_continuous_at_fc() {
        let mut d = diode();
        d.params.cjo = 1e-12;
        d.temperature(&SimOptions::default()).unwrap();
        let vfc = d.params.fc * d.params.vj;
        let (q_lo, c_lo) = d.charge(1.0, vfc - 1e-9, 0.0, 0.0);
        let (q_hi, c_hi) = d.charge(1.0, vfc + 1e-9, 0.0, 0.0);
        assert!((q_hi - q_lo).abs() < 1e-20);
        assert!((c_hi - c_lo).abs() / c_lo < 1e-6);
    }

    #[test]
    fn large_fc_clamped_once() {
        let mut d = diode();
        d.set_model_param("fc", 2.0).unwrap();
        let mut rep = crate::report::CollectingReporter::new();
        d.check_model(&mut rep).unwrap();
        d.check_model(&mut rep).unwrap();
        assert_eq!(rep.count(Severity::Warning), 1);
        assert_eq!(d.params.fc, 0.95);
    }

    #[test]
    fn unknown_parameter_rejected() {
        let mut d = diode();
        assert!(matches!(d.set_model_param("bogus", 1.0), Err(NodalError::BadParam { .. })));
        assert!(d.set_instance_param("D9", "area", 1.0).is_err());
    }
}
