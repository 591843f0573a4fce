//! Geometry- and temperature-dependent parameters of one instance.

use super::params::{InstanceParams, ModelParams};
use super::{EPSOX, EPSSI, EXP_THRESHOLD};
use crate::device::{CHARGE, KOVERQ};

#[derive(Debug, Clone, Default)]
pub struct SizeParams {
    pub leff: f64,
    pub weff: f64,
    pub leff_cv: f64,
    pub weff_cv: f64,
    pub cox: f64,
    /// Thermal voltage at the simulation temperature.
    pub vtm: f64,
    pub t_ratio: f64,
    pub phi: f64,
    pub sqrt_phi: f64,
    pub phis3: f64,
    pub xdep0: f64,
    pub vbi: f64,
    pub cdep0: f64,
    pub k1: f64,
    pub k2: f64,
    pub vbsc: f64,
    /// Bias-independent part of the threshold voltage.
    pub vth_const: f64,
    pub theta0: f64,
    pub theta_dibl: f64,
    /// Subthreshold swing factor.
    pub n: f64,
    pub u0temp: f64,
    pub ua: f64,
    pub ub: f64,
    pub uc: f64,
    pub vsattemp: f64,
    pub litl: f64,
    /// Flat-band voltage used by the charge model.
    pub vfbzb: f64,
    pub drain_sat_current: f64,
    pub source_sat_current: f64,
}

/// Short-channel roll-off shape `e(1 + 2e)` with `e = exp(-x/2)`.
fn roll_off(x: f64) -> f64 {
    let t0 = 0.5 * x;
    if t0 < EXP_THRESHOLD {
        let t1 = (-t0).exp();
        t1 * (1.0 + 2.0 * t1)
    } else {
        0.0
    }
}

fn doping_per_m3(per_cm3: f64) -> f64 {
    // Values above 1e20 were given in m^-3 already.
    if per_cm3 > 1e20 {
        per_cm3
    } else {
        per_cm3 * 1e6
    }
}

impl SizeParams {
    pub fn compute(m: &ModelParams, inst: &InstanceParams, temp: f64, tnom: f64) -> Self {
        let vtm0 = KOVERQ * tnom;
        let vtm = KOVERQ * temp;
        let t_ratio = temp / tnom;
        let eg0 = 1.16 - 7.02e-4 * tnom * tnom / (tnom + 1108.0);
        let ni = 1.45e10 * (tnom / 300.15) * (tnom / 300.15).sqrt() * (21.565_598_1 - eg0 / (2.0 * vtm0)).exp();

        let leff = inst.l - 2.0 * m.lint;
        let weff = inst.w - 2.0 * m.wint;
        let leff_cv = inst.l - 2.0 * m.dlc.unwrap_or(m.lint);
        let weff_cv = inst.w - 2.0 * m.dwc.unwrap_or(m.wint);
        let cox = EPSOX / m.tox;

        let npeak = doping_per_m3(m.npeak) * 1e-6;
        let phi = 2.0 * vtm0 * (npeak / ni).ln();
        let sqrt_phi = phi.sqrt();
        let xdep0 = (2.0 * EPSSI / (CHARGE * npeak * 1e6)).sqrt() * sqrt_phi;
        let vbi = vtm0 * (1e20 * npeak / (ni * ni)).ln();
        let cdep0 = (CHARGE * EPSSI * npeak * 1e6 / 2.0 / phi).sqrt();

        let gamma1 = m.gamma1.unwrap_or(5.753e-12 * npeak.sqrt() / cox);
        let nsub = doping_per_m3(m.nsub) * 1e-6;
        let gamma2 = m.gamma2.unwrap_or(5.753e-12 * nsub.sqrt() / cox);
        let (k1, k2) = match (m.k1, m.k2) {
            (Some(k1), Some(k2)) => (k1, k2),
            (k1, k2) => {
                let vbx = phi - 7.7348e-4 * npeak * m.xt * m.xt;
                let t0 = gamma1 - gamma2;
                let t1 = (phi - vbx).sqrt() - sqrt_phi;
                let t2 = (phi * (phi - m.vbm)).sqrt() - phi;
                let k2 = k2.unwrap_or(t0 * t1 / (2.0 * t2 + m.vbm));
                let k1 = k1.unwrap_or(gamma2 - 2.0 * k2 * (phi - m.vbm).sqrt());
                (k1, k2)
            }
        };
        let vbsc = if k2 < 0.0 {
            let t0 = 0.5 * k1 / k2;
            (0.9 * (phi - t0 * t0)).clamp(-30.0, -3.0)
        } else {
            -30.0
        };

        let factor1 = (EPSSI / EPSOX * m.tox).sqrt();
        let lt0 = factor1 * xdep0.sqrt();
        let theta0 = roll_off(m.dvt1 * leff / lt0);
        let thetaw = roll_off(m.dvt1w * weff * leff / lt0);
        let theta_dibl = roll_off(m.dsub * leff / lt0);
        let delt_vth = m.dvt0 * theta0 * (vbi - phi);
        let delt_vthw = m.dvt0w * thetaw * (vbi - phi);

        let vth0 = m.typ * m.vth0();
        let vth_const = vth0 - k1 * sqrt_phi
            + k1 * ((1.0 + m.nlx / leff).sqrt() - 1.0) * sqrt_phi
            - delt_vth
            - delt_vthw
            + (m.kt1 + m.kt1l / leff) * (t_ratio - 1.0);

        let tmp = (m.nfactor * EPSSI / xdep0 + m.cdsc * theta0 + m.cit) / cox;
        let n = if tmp >= -0.5 {
            1.0 + tmp
        } else {
            (1.0 + 3.0 * tmp) / (3.0 + 8.0 * tmp)
        };

        Self {
            leff,
            weff,
            leff_cv,
            weff_cv,
            cox,
            vtm,
            t_ratio,
            phi,
            sqrt_phi,
            phis3: sqrt_phi * phi,
            xdep0,
            vbi,
            cdep0,
            k1,
            k2,
            vbsc,
            vth_const,
            theta0,
            theta_dibl,
            n,
            u0temp: m.u0_si() * t_ratio.powf(m.ute),
            ua: m.ua + m.ua1 * (t_ratio - 1.0),
            ub: m.ub + m.ub1 * (t_ratio - 1.0),
            uc: m.uc + m.uc1 * (t_ratio - 1.0),
            vsattemp: m.vsat - m.at * (t_ratio - 1.0),
            litl: (3.0 * m.xj * m.tox).sqrt(),
            vfbzb: vth0 - phi - k1 * sqrt_phi,
            drain_sat_current: m.js * inst.ad + m.jssw * inst.pd,
            source_sat_current: m.js * inst.as_ + m.jssw * inst.ps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::REFTEMP;

    #[test]
    fn nominal_size_params_are_physical() {
        let p = SizeParams::compute(&ModelParams::default(), &InstanceParams::default(), REFTEMP, REFTEMP);
        assert!(p.phi > 0.6 && p.phi < 1.2, "phi = {}", p.phi);
        assert!(p.k1 > 0.0);
        assert!(p.xdep0 > 0.0 && p.xdep0 < 1e-6);
        assert!(p.n >= 1.0);
        assert_eq!(p.t_ratio, 1.0);
        assert!((p.u0temp - 0.067).abs() < 1e-12);
        assert!((-30.0..=-3.0).contains(&p.vbsc));
    }

    #[test]
    fn temperature_lowers_mobility_and_velocity() {
        let m = ModelParams::default();
        let inst = InstanceParams::default();
        let cold = SizeParams::compute(&m, &inst, REFTEMP, REFTEMP);
        let hot = SizeParams::compute(&m, &inst, REFTEMP + 100.0, REFTEMP);
        assert!(hot.u0temp < cold.u0temp);
        assert!(hot.vsattemp < cold.vsattemp);
        assert!(hot.vtm > cold.vtm);
    }

    #[test]
    fn roll_off_vanishes_for_long_channels() {
        assert!(roll_off(1000.0) == 0.0);
        assert!((roll_off(0.0) - 3.0).abs() < 1e-12);
    }
}
