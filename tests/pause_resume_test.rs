//! Pausing and resuming analysis jobs.
//!
//! A job paused part way and resumed must produce exactly the points an
//! uninterrupted run produces.

use nodal::analysis::ac::{AcAnalysis, AcSweepType};
use nodal::analysis::dc::DcSweep;
use nodal::analysis::transient::Transient;
use nodal::analysis::{Analysis, OutputSink, PauseFlag, Plot, PlotId, PlotMeta, Recorder, RunStatus};
use nodal::device::capacitor::Capacitor;
use nodal::device::diode::Diode;
use nodal::device::resistor::Resistor;
use nodal::device::vsource::VoltageSource;
use nodal::options::SimOptions;
use nodal::Circuit;
use num_complex::Complex64;

// ── Helpers ─────────────────────────────────────────────────────────

/// Records like [`Recorder`] and requests a pause after every
/// `every` dumped points.
struct PausingSink {
    inner: Recorder,
    pause: PauseFlag,
    every: usize,
    dumped: usize,
}

impl PausingSink {
    fn new(pause: PauseFlag, every: usize) -> Self {
        Self {
            inner: Recorder::new(),
            pause,
            every,
            dumped: 0,
        }
    }

    fn point_dumped(&mut self) {
        self.dumped += 1;
        if self.dumped % self.every == 0 {
            self.pause.request();
        }
    }
}

impl OutputSink for PausingSink {
    fn begin_plot(&mut self, meta: PlotMeta) -> PlotId {
        self.inner.begin_plot(meta)
    }

    fn dump_real(&mut self, plot: PlotId, scale: f64, values: &[f64]) {
        self.inner.dump_real(plot, scale, values);
        self.point_dumped();
    }

    fn dump_complex(&mut self, plot: PlotId, scale: f64, values: &[Complex64]) {
        self.inner.dump_complex(plot, scale, values);
        self.point_dumped();
    }
}

/// Diode clamp behind an RC load, with an AC-driven source.
fn clamp_circuit() -> Circuit {
    let mut ckt = Circuit::new(SimOptions::default());
    let mut v = VoltageSource::new("vsrc");
    v.add("v1", "in", "0", 2.0).with_ac(1.0, 0.0);
    let mut r = Resistor::new("res");
    r.add("r1", "in", "out", 1e3);
    let mut c = Capacitor::new("cap");
    c.add("c1", "out", "0", 1e-9);
    let mut d = Diode::new("dmod");
    d.add("d1", "out", "0");
    ckt.add(v).unwrap();
    ckt.add(r).unwrap();
    ckt.add(c).unwrap();
    ckt.add(d).unwrap();
    ckt
}

fn uninterrupted(analysis: &mut dyn Analysis) -> Plot {
    let mut ckt = clamp_circuit();
    let mut rec = Recorder::new();
    let status = analysis.run(&mut ckt, &mut rec, &PauseFlag::new()).unwrap();
    assert_eq!(status, RunStatus::Completed);
    assert_eq!(rec.plots().len(), 1);
    rec.last().cloned().unwrap()
}

/// Run with a pause every `every` points, resuming until done. Returns
/// the plot and the number of pauses.
fn interrupted(analysis: &mut dyn Analysis, every: usize) -> (Plot, usize) {
    let mut ckt = clamp_circuit();
    let pause = PauseFlag::new();
    let mut sink = PausingSink::new(pause.clone(), every);
    let mut pauses = 0;
    loop {
        match analysis.run(&mut ckt, &mut sink, &pause).unwrap() {
            RunStatus::Paused => pauses += 1,
            RunStatus::Completed => break,
        }
        assert!(pauses < 10_000, "job never completes");
    }
    assert_eq!(sink.inner.plots().len(), 1, "resuming must not open a new plot");
    (sink.inner.last().cloned().unwrap(), pauses)
}

fn assert_same_points(a: &Plot, b: &Plot) {
    assert_eq!(a.meta, b.meta);
    assert_eq!(a.scale, b.scale);
    assert_eq!(a.real, b.real);
    assert_eq!(a.complex, b.complex);
}

// ── Jobs ────────────────────────────────────────────────────────────

#[test]
fn test_transient_pause_resume_matches() {
    let reference = uninterrupted(&mut Transient::new(1e-8, 2e-6));
    let (resumed, pauses) = interrupted(&mut Transient::new(1e-8, 2e-6), 7);
    assert!(pauses >= 2, "expected several pauses, got {pauses}");
    assert_same_points(&reference, &resumed);
}

#[test]
fn test_dc_sweep_pause_resume_matches() {
    let reference = uninterrupted(&mut DcSweep::new("v1", -1.0, 2.0, 0.1));
    let (resumed, pauses) = interrupted(&mut DcSweep::new("v1", -1.0, 2.0, 0.1), 5);
    assert!(pauses >= 2);
    assert_eq!(resumed.len(), 31);
    assert_same_points(&reference, &resumed);
}

#[test]
fn test_ac_pause_resume_matches() {
    let reference = uninterrupted(&mut AcAnalysis::new(AcSweepType::Dec, 10, 1e3, 1e9));
    let (resumed, pauses) = interrupted(&mut AcAnalysis::new(AcSweepType::Dec, 10, 1e3, 1e9), 4);
    assert!(pauses >= 2);
    assert_same_points(&reference, &resumed);
}

#[test]
fn test_pause_before_start_does_no_work() {
    let mut ckt = clamp_circuit();
    let pause = PauseFlag::new();
    pause.request();
    let mut rec = Recorder::new();
    let mut sweep = DcSweep::new("v1", 0.0, 1.0, 0.5);
    assert_eq!(sweep.run(&mut ckt, &mut rec, &pause).unwrap(), RunStatus::Paused);
    assert!(!pause.is_requested(), "a pause request is consumed");
    assert!(rec.last().map_or(true, |p| p.is_empty()));

    assert_eq!(sweep.run(&mut ckt, &mut rec, &pause).unwrap(), RunStatus::Completed);
    assert_eq!(rec.last().unwrap().len(), 3);
}
