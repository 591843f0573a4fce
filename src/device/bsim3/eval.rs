//! Drain current and intrinsic charges with their bias derivatives.
//!
//! Both evaluations work in the forward, n-type frame: `vds >= 0` and the
//! polarity already folded into the voltages. Derivative names follow the
//! usual pattern: `_dvg` is the derivative with respect to `Vgsteff` until
//! the final assembly, `_dvd` and `_dvb` are partials at fixed `Vgsteff`
//! (and `_dvb` is taken with respect to `Vbseff` until multiplied by
//! `dvbseff_dvb`).

use super::params::ModelParams;
use super::temp::SizeParams;
use super::{EXP_THRESHOLD, MAX_EXP};

/// Drain current, its conductances and the intermediate quantities the
/// charge model reuses.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcEval {
    pub ids: f64,
    pub gm: f64,
    pub gds: f64,
    pub gmbs: f64,
    pub vth: f64,
    pub vdsat: f64,
    pub vbseff: f64,
    pub dvbseff_dvb: f64,
    pub sqrt_phis: f64,
    pub dsqrt_phis_dvb: f64,
    pub abulk: f64,
    pub dabulk_dvb: f64,
}

pub fn dc(p: &SizeParams, m: &ModelParams, vgs: f64, vds: f64, vbs: f64) -> DcEval {
    // Effective substrate bias, smoothly clamped at vbsc.
    let t0 = vbs - p.vbsc - 0.001;
    let t1 = (t0 * t0 - 0.004 * p.vbsc).sqrt();
    let mut vbseff = p.vbsc + 0.5 * (t0 + t1);
    let mut dvbseff_dvb = 0.5 * (1.0 + t0 / t1);
    if vbseff < vbs {
        vbseff = vbs;
        dvbseff_dvb = 1.0;
    }

    let (sqrt_phis, dsqrt_phis_dvb) = if vbseff > 0.0 {
        let s = p.phis3 / (p.phi + 0.5 * vbseff);
        (s, -0.5 * s * s / p.phis3)
    } else {
        let s = (p.phi - vbseff).sqrt();
        (s, -0.5 / s)
    };
    let xdep = p.xdep0 * sqrt_phis / p.sqrt_phi;
    let dxdep_dvb = p.xdep0 / p.sqrt_phi * dsqrt_phis_dvb;

    // Threshold voltage.
    let narrow = m.tox * p.phi / (p.weff + m.w0);
    let dibl = (m.eta0 + m.etab * vbseff) * p.theta_dibl;
    let vth = p.vth_const + p.k1 * sqrt_phis - p.k2 * vbseff
        + (m.k3 + m.k3b * vbseff) * narrow
        - dibl * vds
        + m.kt2 * vbseff * (p.t_ratio - 1.0);
    let dvth_dvb = p.k1 * dsqrt_phis_dvb - p.k2 + m.k3b * narrow - m.etab * p.theta_dibl * vds
        + m.kt2 * (p.t_ratio - 1.0);
    let dvth_dvd = -dibl;

    // Effective gate overdrive.
    let vtm = p.vtm;
    let n = p.n;
    let vgst = vgs - vth;
    let t10 = 2.0 * n * vtm;
    let vgst_nvt = vgst / t10;
    let exp_arg = (2.0 * m.voff - vgst) / t10;
    let (vgsteff, dvgsteff_dvg) = if vgst_nvt > EXP_THRESHOLD {
        (vgst, 1.0)
    } else if exp_arg > EXP_THRESHOLD {
        let t0 = (vgst - m.voff) / (n * vtm);
        let v = vtm * p.cdep0 / p.cox * t0.exp();
        (v, v / (n * vtm))
    } else {
        let exp_vgst = vgst_nvt.exp();
        let t1 = t10 * exp_vgst.ln_1p();
        let dt1_dvg = exp_vgst / (1.0 + exp_vgst);
        let dt2_dvg = -p.cox / (vtm * p.cdep0) * exp_arg.exp();
        let t2 = 1.0 - t10 * dt2_dvg;
        (t1 / t2, (t2 * dt1_dvg - t1 * dt2_dvg) / (t2 * t2))
    };
    let dvgsteff_dvd = -dvgsteff_dvg * dvth_dvd;
    let dvgsteff_dvb = -dvgsteff_dvg * dvth_dvb;

    // Bulk charge factor.
    let t1 = 0.5 * p.k1 / sqrt_phis;
    let dt1_dvb = -t1 / sqrt_phis * dsqrt_phis_dvb;
    let t9 = (m.xj * xdep).sqrt();
    let tmp1 = p.leff + 2.0 * t9;
    let tmp2 = m.a0 * p.leff / tmp1;
    let t2 = tmp2 + m.b0 / (p.weff + m.b1);
    let dt2_dvb = -t9 / tmp1 / xdep * dxdep_dvb;
    let mut abulk0 = 1.0 + t1 * t2;
    let mut dabulk0_dvb = t1 * tmp2 * dt2_dvb + t2 * dt1_dvb;
    if abulk0 < 0.1 {
        let t9 = 1.0 / (3.0 - 20.0 * abulk0);
        abulk0 = (0.2 - abulk0) * t9;
        dabulk0_dvb *= t9 * t9;
    }
    let t2 = m.keta * vbseff;
    let (t0, dt0_dvb) = if t2 >= -0.9 {
        let t0 = 1.0 / (1.0 + t2);
        (t0, -m.keta * t0 * t0)
    } else {
        let t1 = 1.0 / (0.8 + t2);
        ((17.0 + 20.0 * t2) * t1, -m.keta * t1 * t1)
    };
    let abulk = abulk0 * t0;
    let dabulk_dvb = dabulk0_dvb * t0 + abulk0 * dt0_dvb;

    // Mobility degradation.
    let t0 = vgsteff + 2.0 * vth;
    let t2 = p.ua + p.uc * vbseff;
    let t3 = t0 / m.tox;
    let t5 = t3 * (t2 + p.ub * t3);
    let mut ddenomi_dvg = (t2 + 2.0 * p.ub * t3) / m.tox;
    let mut ddenomi_dvd = ddenomi_dvg * 2.0 * dvth_dvd;
    let mut ddenomi_dvb = ddenomi_dvg * 2.0 * dvth_dvb + p.uc * t3;
    let denomi = if t5 >= -0.8 {
        1.0 + t5
    } else {
        let t9 = 1.0 / (7.0 + 10.0 * t5);
        let d = (0.6 + t5) * t9;
        let t9 = t9 * t9;
        ddenomi_dvg *= t9;
        ddenomi_dvd *= t9;
        ddenomi_dvb *= t9;
        d
    };
    let ueff = p.u0temp / denomi;
    let t9 = -ueff / denomi;
    let dueff_dvg = t9 * ddenomi_dvg;
    let dueff_dvd = t9 * ddenomi_dvd;
    let dueff_dvb = t9 * ddenomi_dvb;

    // Velocity saturation.
    let esat_l = 2.0 * p.vsattemp / ueff * p.leff;
    let t0 = -esat_l / ueff;
    let desatl_dvg = t0 * dueff_dvg;
    let desatl_dvd = t0 * dueff_dvd;
    let desatl_dvb = t0 * dueff_dvb;

    let (a1, a2) = (m.a1, m.a2);
    let (lambda, dlambda_dvg) = if a1 == 0.0 {
        (a2, 0.0)
    } else if a1 > 0.0 {
        let t0 = 1.0 - a2;
        let t1 = t0 - a1 * vgsteff - 0.0001;
        let t2 = (t1 * t1 + 0.0004 * t0).sqrt();
        (a2 + t0 - 0.5 * (t1 + t2), 0.5 * a1 * (1.0 + t1 / t2))
    } else {
        let t1 = a2 + a1 * vgsteff - 0.0001;
        let t2 = (t1 * t1 + 0.0004 * a2).sqrt();
        (0.5 * (t1 + t2), 0.5 * a1 * (1.0 + t1 / t2))
    };

    let vgst2vtm = vgsteff + 2.0 * vtm;
    let vdsat;
    let dvdsat_dvg;
    let dvdsat_dvd;
    let dvdsat_dvb;
    let tmp1;
    if lambda == 1.0 {
        let t0 = 1.0 / (abulk * esat_l + vgst2vtm);
        let t1 = t0 * t0;
        let t2 = vgst2vtm * t0;
        let t3 = esat_l * vgst2vtm;
        let dt0_dvg = -(abulk * desatl_dvg + 1.0) * t1;
        let dt0_dvd = -(abulk * desatl_dvd) * t1;
        let dt0_dvb = -(abulk * desatl_dvb + dabulk_dvb * esat_l) * t1;
        vdsat = t3 * t0;
        dvdsat_dvg = t3 * dt0_dvg + t2 * desatl_dvg + esat_l * t0;
        dvdsat_dvd = t3 * dt0_dvd + t2 * desatl_dvd;
        dvdsat_dvb = t3 * dt0_dvb + t2 * desatl_dvb;
        tmp1 = 0.0;
    } else {
        tmp1 = dlambda_dvg / (lambda * lambda);
        let t0 = 2.0 * abulk * (1.0 / lambda - 1.0);
        let dt0_dvg = -2.0 * abulk * tmp1;
        let dt0_dvb = 2.0 * (1.0 / lambda - 1.0) * dabulk_dvb;
        let t1 = vgst2vtm * (2.0 / lambda - 1.0) + abulk * esat_l;
        let dt1_dvg = (2.0 / lambda - 1.0) - 2.0 * vgst2vtm * tmp1 + abulk * desatl_dvg;
        let dt1_dvb = abulk * desatl_dvb + esat_l * dabulk_dvb;
        let dt1_dvd = abulk * desatl_dvd;
        let t2 = vgst2vtm * esat_l;
        let dt2_dvg = esat_l + vgst2vtm * desatl_dvg;
        let dt2_dvb = vgst2vtm * desatl_dvb;
        let dt2_dvd = vgst2vtm * desatl_dvd;
        let t3 = (t1 * t1 - 2.0 * t0 * t2).sqrt();
        vdsat = (t1 - t3) / t0;
        dvdsat_dvg = (dt1_dvg - (t1 * dt1_dvg - dt0_dvg * t2 - t0 * dt2_dvg) / t3 - vdsat * dt0_dvg) / t0;
        dvdsat_dvb = (dt1_dvb - (t1 * dt1_dvb - dt0_dvb * t2 - t0 * dt2_dvb) / t3 - vdsat * dt0_dvb) / t0;
        dvdsat_dvd = (dt1_dvd - (t1 * dt1_dvd - t0 * dt2_dvd) / t3) / t0;
    }

    // Smooth effective drain voltage.
    let delta = m.delta;
    let t1 = vdsat - vds - delta;
    let dt1_dvd = dvdsat_dvd - 1.0;
    let t2 = (t1 * t1 + 4.0 * delta * vdsat).sqrt();
    let t0 = t1 / t2;
    let t3 = 2.0 * delta / t2;
    let dt2_dvg = t0 * dvdsat_dvg + t3 * dvdsat_dvg;
    let dt2_dvd = t0 * dt1_dvd + t3 * dvdsat_dvd;
    let dt2_dvb = t0 * dvdsat_dvb + t3 * dvdsat_dvb;
    let mut vdseff = vdsat - 0.5 * (t1 + t2);
    let mut dvdseff_dvg = dvdsat_dvg - 0.5 * (dvdsat_dvg + dt2_dvg);
    let dvdseff_dvd = dvdsat_dvd - 0.5 * (dt1_dvd + dt2_dvd);
    let mut dvdseff_dvb = dvdsat_dvb - 0.5 * (dvdsat_dvb + dt2_dvb);
    if vds == 0.0 {
        vdseff = 0.0;
        dvdseff_dvg = 0.0;
        dvdseff_dvb = 0.0;
    }

    // Early voltage at saturation.
    let t0 = esat_l + vdsat;
    let dt0_dvg = desatl_dvg + dvdsat_dvg;
    let dt0_dvd = desatl_dvd + dvdsat_dvd;
    let dt0_dvb = desatl_dvb + dvdsat_dvb;
    let t1 = 2.0 / lambda - 1.0;
    let dt1_dvg = -2.0 * tmp1;
    let vasat = t0 / t1;
    let dvasat_dvg = (dt0_dvg - vasat * dt1_dvg) / t1;
    let dvasat_dvd = dt0_dvd / t1;
    let dvasat_dvb = dt0_dvb / t1;

    if vdseff > vds {
        vdseff = vds;
    }
    let diff_vds = vds - vdseff;

    // Channel-length modulation.
    let (vaclm, dvaclm_dvg, dvaclm_dvd, dvaclm_dvb) = if m.pclm > 0.0 && diff_vds > 1e-10 {
        let t0 = 1.0 / (m.pclm * abulk * p.litl);
        let dt0_dvb = -t0 / abulk * dabulk_dvb;
        let t2 = vgsteff / esat_l;
        let t1 = abulk + t2;
        let dt1_dvg = (1.0 - t2 * desatl_dvg) / esat_l;
        let dt1_dvb = dabulk_dvb - t2 * desatl_dvb / esat_l;
        let dt1_dvd = -t2 * desatl_dvd / esat_l;
        let t9 = t0 * t1;
        (
            t9 * diff_vds,
            t0 * dt1_dvg * diff_vds - t9 * dvdseff_dvg,
            t0 * dt1_dvd * diff_vds + t9 * (1.0 - dvdseff_dvd),
            (dt0_dvb * t1 + t0 * dt1_dvb) * diff_vds - t9 * dvdseff_dvb,
        )
    } else {
        (MAX_EXP, 0.0, 0.0, 0.0)
    };
    let va = vasat + vaclm;
    let dva_dvg = dvasat_dvg + dvaclm_dvg;
    let dva_dvd = dvasat_dvd + dvaclm_dvd;
    let dva_dvb = dvasat_dvb + dvaclm_dvb;

    // Linear-region current.
    let cox_wov_l = p.cox * p.weff / p.leff;
    let beta = ueff * cox_wov_l;
    let dbeta_dvg = cox_wov_l * dueff_dvg;
    let dbeta_dvd = cox_wov_l * dueff_dvd;
    let dbeta_dvb = cox_wov_l * dueff_dvb;

    let t0 = 1.0 - 0.5 * abulk * vdseff / vgst2vtm;
    let dt0_dvg = -0.5 * (abulk * dvdseff_dvg - abulk * vdseff / vgst2vtm) / vgst2vtm;
    let dt0_dvd = -0.5 * abulk * dvdseff_dvd / vgst2vtm;
    let dt0_dvb = -0.5 * (abulk * dvdseff_dvb + dabulk_dvb * vdseff) / vgst2vtm;
    let gche = beta * t0;
    let dgche_dvg = dbeta_dvg * t0 + beta * dt0_dvg;
    let dgche_dvd = dbeta_dvd * t0 + beta * dt0_dvd;
    let dgche_dvb = dbeta_dvb * t0 + beta * dt0_dvb;

    let idl = gche * vdseff;
    let didl_dvg = gche * dvdseff_dvg + vdseff * dgche_dvg;
    let didl_dvd = gche * dvdseff_dvd + vdseff * dgche_dvd;
    let didl_dvb = gche * dvdseff_dvb + vdseff * dgche_dvb;

    let t9 = diff_vds / va;
    let t0 = 1.0 + t9;
    let ids = idl * t0;
    let dids_dvg = t0 * didl_dvg - idl * (dvdseff_dvg + t9 * dva_dvg) / va;
    let dids_dvd = t0 * didl_dvd + idl * (1.0 - dvdseff_dvd - t9 * dva_dvd) / va;
    let dids_dvb = t0 * didl_dvb - idl * (dvdseff_dvb + t9 * dva_dvb) / va;

    DcEval {
        ids,
        gm: dids_dvg * dvgsteff_dvg,
        gds: dids_dvd + dids_dvg * dvgsteff_dvd,
        gmbs: (dids_dvb + dids_dvg * dvgsteff_dvb) * dvbseff_dvb,
        vth,
        vdsat,
        vbseff,
        dvbseff_dvb,
        sqrt_phis,
        dsqrt_phis_dvb,
        abulk,
        dabulk_dvb,
    }
}

/// Intrinsic gate, drain and bulk charges. `caps[row][col]` holds
/// `dQ_row / dV_col` with rows `[g, d, b]` and columns `[vgs, vds, vbs]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChargeEval {
    pub qg: f64,
    pub qd: f64,
    pub qb: f64,
    pub caps: [[f64; 3]; 3],
}

const G: usize = 0;
const D: usize = 1;
const B: usize = 2;

/// Charge-sheet model with a 50/50 channel charge partition.
pub fn charge(p: &SizeParams, dc: &DcEval, vgs: f64, vds: f64) -> ChargeEval {
    let cox_wl = p.cox * p.weff_cv * p.leff_cv;
    let vfb = p.vfbzb;
    let dvbseff = dc.dvbseff_dvb;
    let arg1 = vgs - dc.vbseff - vfb;
    let vth_cv = vfb + p.phi + p.k1 * dc.sqrt_phis;
    let dvth_cv_dvb = p.k1 * dc.dsqrt_phis_dvb * dvbseff;
    let vgst = vgs - vth_cv;
    let mut out = ChargeEval::default();

    if arg1 <= 0.0 {
        // Accumulation.
        out.qg = cox_wl * arg1;
        out.qb = -out.qg;
        out.caps[G] = [cox_wl, 0.0, -cox_wl * dvbseff];
        out.caps[B] = [-cox_wl, 0.0, cox_wl * dvbseff];
    } else if vgst <= 0.0 {
        // Depletion.
        let t1 = 0.5 * p.k1;
        let t2 = (t1 * t1 + arg1).sqrt();
        out.qg = cox_wl * p.k1 * (t2 - t1);
        out.qb = -out.qg;
        let dq = cox_wl * p.k1 * 0.5 / t2;
        out.caps[G] = [dq, 0.0, -dq * dvbseff];
        out.caps[B] = [-dq, 0.0, dq * dvbseff];
    } else {
        // Inversion; the drain voltage is clamped at the CV saturation voltage.
        let a = dc.abulk;
        let da = [0.0, 0.0, dc.dabulk_dvb * dvbseff];
        let dvgst = [1.0, 0.0, -dvth_cv_dvb];
        let vdsat = vgst / a;
        let (x, dx) = if vds < vdsat {
            (vds, [0.0, 1.0, 0.0])
        } else {
            (vdsat, [1.0 / a, 0.0, (-dvth_cv_dvb - vdsat * da[2]) / a])
        };
        let d = vgst - 0.5 * a * x;
        let g = a * x * x / (12.0 * d);
        let dg_dx = a * x / (6.0 * d) + a * a * x * x / (24.0 * d * d);
        let dg_da = x * x / (12.0 * d) + a * x * x * x / (24.0 * d * d);
        let dg_dvgst = -a * x * x / (12.0 * d * d);
        let f = 0.5 * x - g;
        let df: [f64; 3] =
            std::array::from_fn(|k| 0.5 * dx[k] - (dg_dx * dx[k] + dg_da * da[k] + dg_dvgst * dvgst[k]));

        out.qg = cox_wl * (vgs - vfb - p.phi - f);
        out.qb = cox_wl * (-p.k1 * dc.sqrt_phis + (1.0 - a) * f);
        let qinv = -cox_wl * (vgst - a * f);
        out.qd = 0.5 * qinv;

        let dsqrt = [0.0, 0.0, p.k1 * dc.dsqrt_phis_dvb * dvbseff];
        for k in 0..3 {
            let unit_g = if k == 0 { 1.0 } else { 0.0 };
            out.caps[G][k] = cox_wl * (unit_g - df[k]);
            out.caps[B][k] = cox_wl * (-dsqrt[k] + (1.0 - a) * df[k] - f * da[k]);
            out.caps[D][k] = -0.5 * cox_wl * (dvgst[k] - a * df[k] - f * da[k]);
        }
    }
    out
}
