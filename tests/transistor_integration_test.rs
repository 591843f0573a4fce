//! Integration tests for BSIM3 MOSFET circuits: model checks through the
//! circuit, drain/source symmetry and a CMOS inverter transfer curve.

use approx::assert_relative_eq;
use nodal::analysis::op::operating_point;
use nodal::analysis::{Analysis, PauseFlag, Recorder, RunStatus};
use nodal::context::AnalysisMode;
use nodal::deck::Deck;
use nodal::device::bsim3::Bsim3;
use nodal::device::vsource::VoltageSource;
use nodal::options::SimOptions;
use nodal::report::{CollectingReporter, Severity};
use nodal::{Circuit, NodalError};
use std::path::Path;

// ── Helpers ─────────────────────────────────────────────────────────

fn nmos(name: &str) -> Bsim3 {
    let mut m = Bsim3::new(name);
    m.model.tox = 1.5e-8;
    m.model.vth0 = Some(0.7);
    m
}

/// NMOS `m1` (d g s 0) with a voltage source on each of d, g and s.
fn biased_nmos(model: Bsim3, vd: f64, vg: f64, vs: f64) -> Circuit {
    let mut ckt = Circuit::with_reporter(SimOptions::default(), Box::new(CollectingReporter::new()));
    let mut src = VoltageSource::new("vsrc");
    src.add("vd", "d", "0", vd)
        .add("vg", "g", "0", vg)
        .add("vs", "s", "0", vs);
    ckt.add(src).unwrap();
    ckt.add(model).unwrap();
    ckt
}

fn warnings(ckt: &Circuit) -> Vec<String> {
    ckt.reporter()
        .diagnostics()
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .map(|d| d.message.clone())
        .collect()
}

// ── Model checks ────────────────────────────────────────────────────

#[test]
fn test_clamped_parameters_warn_once() {
    let mut model = nmos("nch");
    model.add("m1", "d", "g", "s", "0");
    let mut ckt = biased_nmos(model, 1.0, 1.5, 0.0);
    ckt.set_model_param("nch", "a2", 3.0).unwrap();
    ckt.set_model_param("nch", "cgdo", -1e-10).unwrap();

    ckt.setup().unwrap();
    let first = warnings(&ckt);
    assert!(first.iter().any(|m| m.starts_with("A2 = 3")), "{first:?}");
    assert!(first.iter().any(|m| m.starts_with("CGDO")), "{first:?}");

    // A fresh elaboration checks the already clamped model again.
    ckt.set_instance_param("m1", "w", 10e-6).unwrap();
    ckt.setup().unwrap();
    assert_eq!(warnings(&ckt), first);

    operating_point(&mut ckt, AnalysisMode::DcOp).expect("clamped model must still solve");
}

#[test]
fn test_fatal_parameter_aborts_setup() {
    let mut model = nmos("nch");
    model.add("m1", "d", "g", "s", "0");
    let mut ckt = biased_nmos(model, 1.0, 1.5, 0.0);
    ckt.set_model_param("nch", "u0", -1.0).unwrap();

    let err = operating_point(&mut ckt, AnalysisMode::DcOp).unwrap_err();
    assert!(matches!(err, NodalError::ParameterFatal { .. }), "got {err}");
    let fatal = ckt.reporter().diagnostics().iter().filter(|d| d.severity == Severity::Fatal).count();
    assert!(fatal >= 1);
    assert_eq!(ckt.ctx.stats.newton_iterations, 0);
}

#[test]
fn test_unknown_model_parameter() {
    let mut ckt = Circuit::new(SimOptions::default());
    ckt.add(nmos("nch")).unwrap();
    assert!(matches!(
        ckt.set_model_param("nch", "not_a_param", 1.0),
        Err(NodalError::BadParam { .. })
    ));
}

// ── Symmetry ────────────────────────────────────────────────────────

/// Swapping the drain and source bias mirrors the terminal currents.
#[test]
fn test_drain_source_swap_mirrors_currents() {
    let solve = |vd: f64, vs: f64| {
        let mut model = nmos("nch");
        model.add("m1", "d", "g", "s", "0");
        let mut ckt = biased_nmos(model, vd, 2.0, vs);
        operating_point(&mut ckt, AnalysisMode::DcOp).expect("op failed");
        (ckt.branch_current("vd").unwrap(), ckt.branch_current("vs").unwrap())
    };
    let (fwd_d, fwd_s) = solve(1.0, 0.0);
    let (rev_d, rev_s) = solve(0.0, 1.0);

    assert!(fwd_d < 0.0, "vd should deliver the drain current, got {fwd_d}");
    assert!(fwd_d.abs() > 1e-6, "device should be on, got {fwd_d}");
    assert_relative_eq!(fwd_d, rev_s, max_relative = 1e-4);
    assert_relative_eq!(fwd_s, rev_d, max_relative = 1e-4);
}

#[test]
fn test_nmos_off_below_threshold() {
    let mut model = nmos("nch");
    model.add("m1", "d", "g", "s", "0");
    let mut ckt = biased_nmos(model, 1.0, 0.0, 0.0);
    operating_point(&mut ckt, AnalysisMode::DcOp).unwrap();
    let off = ckt.branch_current("vd").unwrap().abs();

    let mut model = nmos("nch");
    model.add("m1", "d", "g", "s", "0");
    let mut ckt = biased_nmos(model, 1.0, 2.0, 0.0);
    operating_point(&mut ckt, AnalysisMode::DcOp).unwrap();
    let on = ckt.branch_current("vd").unwrap().abs();

    assert!(on > 1e3 * off, "on {on} vs off {off}");
}

// ── CMOS inverter ───────────────────────────────────────────────────

#[test]
fn test_inverter_transfer_curve() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("decks/inverter.toml");
    let deck = Deck::load(&path).expect("deck failed to load");
    let mut ckt = deck.build_circuit().expect("deck failed to elaborate");
    let mut analyses = deck.build_analyses();
    assert_eq!(analyses.len(), 1);

    let mut rec = Recorder::new();
    let status = analyses[0].run(&mut ckt, &mut rec, &PauseFlag::new()).expect("sweep failed");
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(ckt.ctx.stats.sweep_points_failed, 0);

    let plot = rec.last().unwrap();
    assert_eq!(plot.len(), 34);
    let vout = plot.real_vector("V(out)").unwrap();
    assert!(vout[0] > 3.2, "output high {}", vout[0]);
    assert!(vout[33] < 0.1, "output low {}", vout[33]);
    assert!(
        vout.windows(2).all(|w| w[1] <= w[0] + 1e-6),
        "transfer curve must fall monotonically: {vout:?}"
    );

    let switch = plot
        .scale
        .iter()
        .zip(&vout)
        .find(|(_, &v)| v < 1.65)
        .map(|(&vin, _)| vin)
        .expect("output never crosses mid-rail");
    assert!(switch > 1.0 && switch < 2.3, "switching point {switch}");
}
