//! Integration tests for diode circuits: Newton convergence, device
//! convergence tests and DC sweeps.

use approx::assert_abs_diff_eq;
use nodal::analysis::dc::DcSweep;
use nodal::analysis::op::operating_point;
use nodal::analysis::{Analysis, PauseFlag, Recorder, RunStatus};
use nodal::context::AnalysisMode;
use nodal::device::diode::Diode;
use nodal::device::resistor::Resistor;
use nodal::device::vsource::VoltageSource;
use nodal::device::{thermal_voltage, REFTEMP};
use nodal::options::SimOptions;
use nodal::Circuit;

// ── Helpers ─────────────────────────────────────────────────────────

/// V1 drives `in`; R from `in` to `a`; diode from `a` to ground.
fn resistor_diode(v: f64, r: f64, options: SimOptions) -> Circuit {
    let mut ckt = Circuit::new(options);
    let mut src = VoltageSource::new("vsrc");
    src.add("v1", "in", "0", v);
    let mut res = Resistor::new("res");
    res.add("r1", "in", "a", r);
    let mut d = Diode::new("dmod");
    d.add("d1", "a", "0");
    ckt.add(src).expect("add source");
    ckt.add(res).expect("add resistor");
    ckt.add(d).expect("add diode");
    ckt
}

/// Residual of KCL at the anode for an ideal Shockley diode with the
/// default saturation current.
fn anode_residual(v: f64, r: f64, va: f64) -> f64 {
    let vt = thermal_voltage(REFTEMP);
    (v - va) / r - 1e-14 * ((va / vt).exp() - 1.0)
}

// ── Operating point ─────────────────────────────────────────────────

#[test]
fn test_forward_biased_diode_converges() {
    let mut ckt = resistor_diode(5.0, 1e3, SimOptions::default());
    let iterations = operating_point(&mut ckt, AnalysisMode::DcOp).expect("op failed");
    assert!(iterations <= 50, "took {iterations} iterations");

    let va = ckt.node_voltage("a").unwrap();
    assert!(va > 0.6 && va < 0.8, "V(a) = {va}");
    let current = (5.0 - va) / 1e3;
    assert!(
        anode_residual(5.0, 1e3, va).abs() < 1e-2 * current,
        "KCL residual too large at V(a) = {va}"
    );
    // Source current flows out of the positive terminal.
    assert_abs_diff_eq!(ckt.branch_current("v1").unwrap(), -current, epsilon = 1e-9);
}

#[test]
fn test_tighter_reltol_is_stable() {
    let mut loose = resistor_diode(5.0, 1e3, SimOptions::default());
    operating_point(&mut loose, AnalysisMode::DcOp).unwrap();

    let tight_opts = SimOptions {
        reltol: 0.5e-3,
        ..SimOptions::default()
    };
    let mut tight = resistor_diode(5.0, 1e3, tight_opts);
    operating_point(&mut tight, AnalysisMode::DcOp).unwrap();

    let (a, b) = (loose.node_voltage("a").unwrap(), tight.node_voltage("a").unwrap());
    assert!((a - b).abs() < 1e-3 * a.abs(), "loose {a} vs tight {b}");
}

#[test]
fn test_reverse_biased_diode_blocks() {
    let mut ckt = resistor_diode(-5.0, 1e3, SimOptions::default());
    operating_point(&mut ckt, AnalysisMode::DcOp).unwrap();
    let va = ckt.node_voltage("a").unwrap();
    assert_abs_diff_eq!(va, -5.0, epsilon = 1e-6);
}

// ── Convergence test ────────────────────────────────────────────────

/// The circuit-level test stops at the first failing device, so several
/// unconverged diodes count as one.
#[test]
fn test_conv_test_counts_first_failure_only() {
    let mut ckt = Circuit::new(SimOptions::default());
    let mut src = VoltageSource::new("vsrc");
    src.add("v1", "in", "0", 2.0);
    let mut res = Resistor::new("res");
    res.add("r1", "in", "a", 1e3).add("r2", "in", "b", 1e3);
    let mut da = Diode::new("da");
    da.add("d1", "a", "0").add("d2", "b", "0");
    let mut db = Diode::new("db");
    db.add("d3", "b", "0");
    ckt.add(src).unwrap();
    ckt.add(res).unwrap();
    ckt.add(da).unwrap();
    ckt.add(db).unwrap();
    operating_point(&mut ckt, AnalysisMode::DcOp).unwrap();

    ckt.ctx.noncon = 0;
    assert!(ckt.conv_test(), "converged point must pass");
    assert_eq!(ckt.ctx.noncon, 0);

    let a = ckt.nodes().find("a").unwrap();
    let b = ckt.nodes().find("b").unwrap();
    ckt.ctx.rhs_old[a] += 0.1;
    ckt.ctx.rhs_old[b] += 0.1;
    assert!(!ckt.conv_test());
    assert_eq!(ckt.ctx.noncon, 1);
}

// ── DC sweep ────────────────────────────────────────────────────────

#[test]
fn test_dc_sweep_diode_characteristic() {
    let mut ckt = resistor_diode(0.0, 1e3, SimOptions::default());
    let mut sweep = DcSweep::new("v1", -1.0, 5.0, 0.5);
    let mut rec = Recorder::new();
    let status = sweep.run(&mut ckt, &mut rec, &PauseFlag::new()).unwrap();
    assert_eq!(status, RunStatus::Completed);

    let plot = rec.last().unwrap();
    assert_eq!(plot.meta.scale, "v1");
    assert_eq!(plot.len(), 13);
    assert_eq!(ckt.ctx.stats.sweep_points_failed, 0);
    let va = plot.real_vector("V(a)").unwrap();
    assert!(va.windows(2).all(|w| w[1] >= w[0]), "V(a) must be monotonic: {va:?}");
    assert_abs_diff_eq!(va[0], -1.0, epsilon = 1e-6);
    assert!(va[12] > 0.6 && va[12] < 0.8);

    // The source goes back to its own value afterwards.
    assert_eq!(ckt.instance_param("v1", "dc"), Some(0.0));
}

#[test]
fn test_dc_sweep_unknown_source() {
    let mut ckt = resistor_diode(1.0, 1e3, SimOptions::default());
    let mut rec = Recorder::new();
    assert!(DcSweep::new("r1", 0.0, 1.0, 0.1)
        .run(&mut ckt, &mut rec, &PauseFlag::new())
        .is_err());
}
