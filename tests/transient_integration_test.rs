//! Integration tests for transient analysis: build -> simulate -> compare
//! against analytical solutions.

use nodal::analysis::transient::Transient;
use nodal::analysis::{Analysis, PauseFlag, Plot, Recorder, RunStatus};
use nodal::device::bsim3::Bsim3;
use nodal::device::capacitor::Capacitor;
use nodal::device::diode::Diode;
use nodal::device::inductor::Inductor;
use nodal::device::resistor::Resistor;
use nodal::device::vsource::VoltageSource;
use nodal::device::waveform::Waveform;
use nodal::options::{IntegrationMethod, SimOptions};
use nodal::Circuit;

// ── Helpers ─────────────────────────────────────────────────────────

/// V1 drives `in`; R from `in` to `out`; C from `out` to ground.
fn rc_circuit(options: SimOptions, source: Option<Waveform>, dc: f64) -> Circuit {
    let mut ckt = Circuit::new(options);
    let mut v = VoltageSource::new("vsrc");
    v.add("v1", "in", "0", dc);
    if let Some(w) = source {
        v.with_waveform(w);
    }
    let mut r = Resistor::new("res");
    r.add("r1", "in", "out", 1e3);
    let mut c = Capacitor::new("cap");
    c.add("c1", "out", "0", 1e-6);
    ckt.add(v).expect("add source");
    ckt.add(r).expect("add resistor");
    ckt.add(c).expect("add capacitor");
    ckt
}

/// Run a transient analysis to completion and return its plot.
fn tran_solve(ckt: &mut Circuit, tran: &mut Transient) -> Plot {
    let mut rec = Recorder::new();
    let status = tran
        .run(ckt, &mut rec, &PauseFlag::new())
        .expect("transient failed");
    assert_eq!(status, RunStatus::Completed);
    rec.last().cloned().expect("no plot recorded")
}

/// Start a transient run and stop before the first step, leaving the
/// t = 0 state in the context.
fn start_only(ckt: &mut Circuit, tran: &mut Transient) -> Plot {
    let pause = PauseFlag::new();
    pause.request();
    let mut rec = Recorder::new();
    let status = tran.run(ckt, &mut rec, &pause).expect("transient start failed");
    assert_eq!(status, RunStatus::Paused);
    rec.last().cloned().expect("no plot recorded")
}

fn max_error(plot: &Plot, vector: &str, exact: impl Fn(f64) -> f64) -> f64 {
    let values = plot.real_vector(vector).expect("vector missing");
    plot.scale
        .iter()
        .zip(&values)
        .map(|(&t, &v)| (v - exact(t)).abs())
        .fold(0.0, f64::max)
}

// ── RC circuits ─────────────────────────────────────────────────────

/// Capacitor starts discharged under UIC and charges towards the source.
#[test]
fn test_rc_charging_uic() {
    let tau = 1e-3;
    let mut ckt = rc_circuit(SimOptions::default(), None, 5.0);
    let plot = tran_solve(&mut ckt, &mut Transient::new(10e-6, 5e-3).with_uic(true));

    assert_eq!(plot.meta.scale, "time");
    assert_eq!(plot.scale[0], 0.0);
    assert_eq!(plot.real_vector("V(out)").unwrap()[0], 0.0);
    let last = *plot.scale.last().unwrap();
    assert!((last - 5e-3).abs() < 1e-12, "run must end at tstop, ended at {last}");
    assert!(plot.scale.windows(2).all(|w| w[1] > w[0]), "time must increase");

    let err = max_error(&plot, "V(out)", |t| 5.0 * (1.0 - (-t / tau).exp()));
    assert!(err < 0.02 * 5.0, "max error {err} exceeds 2%");
    assert!(ckt.ctx.stats.timesteps_accepted as usize >= plot.len() - 1);
}

#[test]
fn test_rc_charging_backward_euler() {
    let tau = 1e-3;
    let opts = SimOptions {
        method: IntegrationMethod::Euler,
        max_order: 1,
        ..SimOptions::default()
    };
    let mut ckt = rc_circuit(opts, None, 5.0);
    let plot = tran_solve(&mut ckt, &mut Transient::new(10e-6, 5e-3).with_uic(true));
    let err = max_error(&plot, "V(out)", |t| 5.0 * (1.0 - (-t / tau).exp()));
    assert!(err < 0.02 * 5.0, "max error {err} exceeds 2%");
}

/// Without UIC the run starts from the operating point, which is already
/// the steady state.
#[test]
fn test_rc_steady_state_from_operating_point() {
    let mut ckt = rc_circuit(SimOptions::default(), None, 5.0);
    let plot = tran_solve(&mut ckt, &mut Transient::new(10e-6, 1e-3));
    let err = max_error(&plot, "V(out)", |_| 5.0);
    assert!(err < 1e-6, "steady state drifted by {err}");
}

#[test]
fn test_rc_pulse_response() {
    let tau = 1e-3;
    let td = 1e-3;
    let pulse = Waveform::Pulse {
        v1: 0.0,
        v2: 1.0,
        td,
        tr: 1e-6,
        tf: 1e-6,
        pw: f64::INFINITY,
        per: 0.0,
    };
    let mut ckt = rc_circuit(SimOptions::default(), Some(pulse), 0.0);
    let plot = tran_solve(&mut ckt, &mut Transient::new(10e-6, 5e-3));

    let err = max_error(&plot, "V(out)", |t| {
        if t <= td {
            0.0
        } else {
            1.0 - (-(t - td) / tau).exp()
        }
    });
    assert!(err < 0.03, "max error {err}");
}

#[test]
fn test_tstart_suppresses_early_points() {
    let mut ckt = rc_circuit(SimOptions::default(), None, 5.0);
    let plot = tran_solve(&mut ckt, &mut Transient::new(10e-6, 2e-3).with_start(1e-3).with_uic(true));
    assert!(!plot.is_empty());
    assert!(plot.scale[0] >= 1e-3, "first recorded time {}", plot.scale[0]);
}

// ── RL circuit ──────────────────────────────────────────────────────

/// Inductor current rises as I = V/R (1 - exp(-t R / L)).
#[test]
fn test_rl_current_rise() {
    let (r, l, v) = (1e3, 1e-3, 1.0);
    let tau = l / r;
    let mut ckt = Circuit::new(SimOptions::default());
    let mut src = VoltageSource::new("vsrc");
    src.add("v1", "in", "0", v);
    let mut res = Resistor::new("res");
    res.add("r1", "in", "mid", r);
    let mut ind = Inductor::new("ind");
    ind.add("l1", "mid", "0", l);
    ckt.add(src).unwrap();
    ckt.add(res).unwrap();
    ckt.add(ind).unwrap();

    let plot = tran_solve(&mut ckt, &mut Transient::new(10e-9, 5e-6).with_uic(true));
    let err = max_error(&plot, "I(l1)", |t| v / r * (1.0 - (-t / tau).exp()));
    assert!(err < 0.02 * v / r, "max current error {err}");
}

// ── Device initial conditions ───────────────────────────────────────

/// A diode `ic` sets the junction voltage the run starts from.
#[test]
fn test_uic_diode_initial_condition() {
    let mut ckt = Circuit::new(SimOptions::default());
    let mut src = VoltageSource::new("vsrc");
    src.add("v1", "in", "0", 1.0);
    let mut res = Resistor::new("res");
    res.add("r1", "in", "a", 1e3);
    let mut d = Diode::new("dmod");
    d.add("d1", "a", "0");
    ckt.add(src).unwrap();
    ckt.add(res).unwrap();
    ckt.add(d).unwrap();
    ckt.set_model_param("dmod", "cjo", 1e-12).unwrap();
    ckt.set_instance_param("d1", "ic", 0.5).unwrap();

    let mut tran = Transient::new(1e-9, 1e-8).with_uic(true);
    let plot = start_only(&mut ckt, &mut tran);
    assert_eq!(plot.scale, vec![0.0]);
    // The diode owns the only state slots; its junction voltage is first.
    assert_eq!(ckt.ctx.state0[0], 0.5, "diode ic ignored");

    let status = tran.run(&mut ckt, &mut Recorder::new(), &PauseFlag::new()).unwrap();
    assert_eq!(status, RunStatus::Completed);
}

/// MOSFET `icvds`/`icvgs`/`icvbs` set the terminal biases at t = 0.
#[test]
fn test_uic_mosfet_initial_conditions() {
    let mut ckt = Circuit::new(SimOptions::default());
    let mut src = VoltageSource::new("vsrc");
    src.add("vd", "d", "0", 1.0).add("vg", "g", "0", 1.5);
    let mut m = Bsim3::new("nch");
    m.model.tox = 1.5e-8;
    m.model.vth0 = Some(0.7);
    m.add("m1", "d", "g", "0", "0");
    ckt.add(src).unwrap();
    ckt.add(m).unwrap();
    ckt.set_instance_param("m1", "icvds", 1.2).unwrap();
    ckt.set_instance_param("m1", "icvgs", 2.0).unwrap();
    ckt.set_instance_param("m1", "icvbs", -0.3).unwrap();

    start_only(&mut ckt, &mut Transient::new(1e-9, 1e-8).with_uic(true));
    // Bias slots of the only stateful instance: vbd, vbs, vgs, vds.
    let s = &ckt.ctx.state0;
    assert_eq!(s[1], -0.3);
    assert_eq!(s[2], 2.0);
    assert_eq!(s[3], 1.2);
    assert_eq!(s[0], -0.3 - 1.2);
}
