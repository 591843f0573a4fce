//! End-to-end tests: deck file -> circuit -> every analysis -> CSV.

use nodal::analysis::{Analysis, PauseFlag, Recorder, RunStatus};
use nodal::deck::Deck;
use nodal::output;
use nodal::report::CollectingReporter;
use nodal::NodalError;
use std::path::{Path, PathBuf};

fn deck_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("decks").join(name)
}

fn csv(plot: &nodal::analysis::Plot) -> String {
    let mut buf = Vec::new();
    output::write_plot(plot, &mut buf).expect("write failed");
    String::from_utf8(buf).expect("CSV is not UTF-8")
}

#[test]
fn test_diode_rc_deck_runs_every_analysis() {
    let deck = Deck::load(&deck_path("diode_rc.toml")).expect("deck failed to load");
    assert_eq!(deck.title, "diode clamp with RC load");
    let mut ckt = deck
        .build_circuit_with(Box::new(CollectingReporter::new()))
        .expect("deck failed to elaborate");

    let mut rec = Recorder::new();
    for mut analysis in deck.build_analyses() {
        let status = analysis
            .run(&mut ckt, &mut rec, &PauseFlag::new())
            .unwrap_or_else(|e| panic!("{} failed: {e}", analysis.name()));
        assert_eq!(status, RunStatus::Completed);
    }

    let kinds: Vec<&str> = rec.plots().iter().map(|p| p.meta.analysis).collect();
    assert_eq!(kinds, vec!["op", "dc", "ac", "tran"]);
    assert!(rec.plots().iter().all(|p| !p.is_empty()));

    let op = csv(&rec.plots()[0]);
    assert!(op.starts_with("Variable,Value\n"));
    assert!(op.contains("V(out),"));

    let dc = csv(&rec.plots()[1]);
    assert!(dc.starts_with("vin,"));
    assert_eq!(dc.lines().count(), 1 + 31);

    let ac = csv(&rec.plots()[2]);
    assert!(ac.starts_with("frequency,"));
    assert!(ac.lines().next().unwrap().contains("V(out)_mag,V(out)_phase_deg"));

    let tran = &rec.plots()[3];
    assert_eq!(tran.scale[0], 0.0);
    assert!((tran.scale.last().unwrap() - 3e-6).abs() < 1e-15);
    // The clamp holds the output below a diode drop.
    let peak = tran.real_vector("V(out)").unwrap().into_iter().fold(f64::MIN, f64::max);
    assert!(peak < 1.0, "clamp exceeded: {peak}");

    assert_eq!(ckt.reporter().diagnostics().len(), 0);
}

#[test]
fn test_inverter_deck_elaborates() {
    let deck = Deck::load(&deck_path("inverter.toml")).unwrap();
    let mut ckt = deck.build_circuit().unwrap();
    ckt.setup().unwrap();
    // out, in, vdd plus two source branches
    assert_eq!(ckt.ctx.num_unknowns(), 5);
    assert!(ckt.device("nch").is_some());
    assert!(ckt.device("pch").is_some());
}

#[test]
fn test_missing_deck_is_io_error() {
    let err = Deck::load(&deck_path("no_such_deck.toml")).unwrap_err();
    assert!(matches!(err, NodalError::Io(_)));
}

#[test]
fn test_malformed_deck_is_syntax_error() {
    let err = Deck::from_toml("title = \"x\"\n[[element]]\nname = 3\n").unwrap_err();
    assert!(matches!(err, NodalError::Toml(_)));
}

#[test]
fn test_ac_deck_with_zero_start_frequency_is_rejected() {
    let text = r#"
[[element]]
name = "v1"
kind = "vsource"
nodes = ["a", "0"]
params = { dc = 1.0, acmag = 1.0 }

[[element]]
name = "r1"
kind = "resistor"
nodes = ["a", "0"]
params = { r = 1e3 }

[[analysis]]
type = "ac"
sweep = "dec"
points = 5
fstart = 0.0
fstop = 1e3
"#;
    let deck = Deck::from_toml(text).unwrap();
    let mut ckt = deck.build_circuit().unwrap();
    let mut rec = Recorder::new();
    let mut analyses = deck.build_analyses();
    let err = analyses[0].run(&mut ckt, &mut rec, &PauseFlag::new()).unwrap_err();
    assert!(matches!(err, NodalError::Analysis(_)), "got {err}");
    assert!(rec.plots().is_empty());
    assert_eq!(ckt.ctx.stats.newton_iterations, 0);
}
