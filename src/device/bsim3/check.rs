//! Parameter validation: fatal range errors, clamped recoverable values
//! and advisory warnings.

use super::params::ModelParams;
use super::temp::SizeParams;
use crate::report::{Reporter, Severity};

/// Range errors of the model and of every instance geometry.
pub fn fatal_reasons(m: &ModelParams, sizes: &[(&str, &SizeParams)]) -> Vec<String> {
    let mut out = Vec::new();
    let mut fatal = |cond: bool, msg: String| {
        if cond {
            out.push(msg);
        }
    };

    fatal(m.tox <= 0.0, format!("Toxe = {} is not positive", m.tox));
    fatal(m.npeak <= 0.0, format!("Nch = {} is not positive", m.npeak));
    fatal(m.nsub <= 0.0, format!("Nsub = {} is not positive", m.nsub));
    fatal(
        m.ngate < 0.0 || m.ngate > 1e25,
        format!("Ngate = {} is not in range [0, 1e25]", m.ngate),
    );
    fatal(m.xj <= 0.0, format!("Xj = {} is not positive", m.xj));
    fatal(m.dvt1 < 0.0, format!("Dvt1 = {} is negative", m.dvt1));
    fatal(m.dvt1w < 0.0, format!("Dvt1w = {} is negative", m.dvt1w));
    fatal(m.dsub < 0.0, format!("Dsub = {} is negative", m.dsub));
    fatal(m.delta < 0.0, format!("Delta = {} is negative", m.delta));
    fatal(m.pclm <= 0.0, format!("Pclm = {} is not positive", m.pclm));

    for (inst, p) in sizes {
        fatal(m.nlx < -p.leff, format!("{inst}: Nlx = {} is less than -Leff", m.nlx));
        fatal(m.w0 == -p.weff, format!("{inst}: (W0 + Weff) = 0 causing divided-by-zero"));
        fatal(p.u0temp <= 0.0, format!("{inst}: mobility at current temperature = {} is not positive", p.u0temp));
        fatal(
            p.vsattemp <= 0.0,
            format!("{inst}: Vsat at current temperature = {} is not positive", p.vsattemp),
        );
        fatal(p.leff <= 0.0, format!("{inst}: Effective channel length = {} is not positive", p.leff));
        fatal(p.leff_cv <= 0.0, format!("{inst}: Effective channel length for C-V = {} is not positive", p.leff_cv));
        fatal(p.weff <= 0.0, format!("{inst}: Effective channel width = {} is not positive", p.weff));
        fatal(p.weff_cv <= 0.0, format!("{inst}: Effective channel width for C-V = {} is not positive", p.weff_cv));
    }
    out
}

/// Clamp recoverable parameters, warning once per change.
pub fn clamp(m: &mut ModelParams, source: &str, reporter: &mut dyn Reporter) {
    if m.a2 < 0.01 {
        reporter.report(Severity::Warning, source, &format!("A2 = {} is too small. Set to 0.01.", m.a2));
        m.a2 = 0.01;
    } else if m.a2 > 1.0 {
        reporter.report(
            Severity::Warning,
            source,
            &format!("A2 = {} is larger than 1. A2 is set to 1 and A1 is set to 0.", m.a2),
        );
        m.a2 = 1.0;
        m.a1 = 0.0;
    }
    for (name, value) in [("CGDO", &mut m.cgdo), ("CGSO", &mut m.cgso), ("CGBO", &mut m.cgbo)] {
        if *value < 0.0 {
            reporter.report(Severity::Warning, source, &format!("{name} = {value} is negative. Set to zero."));
            *value = 0.0;
        }
    }
}

/// Values that are legal but unusual.
pub fn advise(m: &ModelParams, sizes: &[(&str, &SizeParams)], source: &str, reporter: &mut dyn Reporter) {
    let mut warn = |cond: bool, msg: String| {
        if cond {
            reporter.report(Severity::Warning, source, &msg);
        }
    };
    warn(m.tox < 1e-9, format!("Tox = {} is less than 10A", m.tox));
    warn(m.npeak <= 1e15, format!("Nch = {} may be too small", m.npeak));
    warn(m.npeak >= 1e21, format!("Nch = {} may be too large", m.npeak));
    warn(m.nsub <= 1e14, format!("Nsub = {} may be too small", m.nsub));
    warn(m.nsub >= 1e21, format!("Nsub = {} may be too large", m.nsub));
    warn(m.dvt0 < 0.0, format!("Dvt0 = {} is negative", m.dvt0));
    warn(m.nfactor < 0.0, format!("Nfactor = {} is negative", m.nfactor));
    warn(m.cdsc < 0.0, format!("Cdsc = {} is negative", m.cdsc));
    warn(m.eta0 < 0.0, format!("Eta0 = {} is negative", m.eta0));
    for (inst, p) in sizes {
        warn(p.leff <= 5e-8, format!("{inst}: Leff = {} may be too small", p.leff));
        warn(
            p.vsattemp > 0.0 && p.vsattemp < 1e3,
            format!("{inst}: Vsat at current temperature = {} may be too small", p.vsattemp),
        );
    }
}
