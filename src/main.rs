use clap::Parser;
use nodal::analysis::{PauseFlag, Recorder, RunStatus};
use nodal::deck::Deck;
use nodal::options::SolverBackend;
use nodal::output;
use nodal::report::{CollectingReporter, Severity};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

/// Sparse-matrix circuit simulator
#[derive(Parser)]
#[command(name = "nodal", version)]
struct Cli {
    /// TOML circuit deck to simulate
    deck: PathBuf,

    /// Print performance stats to stderr
    #[arg(long)]
    stats: bool,

    /// Linear solver for real systems (native or faer)
    #[arg(long)]
    backend: Option<SolverBackend>,

    /// Write CSV results to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut deck = Deck::load(&cli.deck).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {}", cli.deck.display(), e);
        std::process::exit(1);
    });
    if let Some(backend) = cli.backend {
        deck.options.backend = backend;
    }

    let mut circuit = deck
        .build_circuit_with(Box::new(CollectingReporter::new()))
        .unwrap_or_else(|e| {
            eprintln!("Deck error: {}", e);
            std::process::exit(1);
        });

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path).unwrap_or_else(|e| {
            eprintln!("Error creating {}: {}", path.display(), e);
            std::process::exit(1);
        })),
        None => Box::new(io::stdout()),
    };

    let pause = PauseFlag::new();
    for mut job in deck.build_analyses() {
        let mut recorder = Recorder::new();
        match job.run(&mut circuit, &mut recorder, &pause) {
            Ok(RunStatus::Completed) => {}
            Ok(RunStatus::Paused) => eprintln!("{} analysis paused", job.name()),
            Err(e) => {
                eprintln!("{} analysis error: {}", job.name(), e);
                std::process::exit(1);
            }
        }
        for plot in recorder.plots() {
            output::write_plot(plot, &mut out).unwrap_or_else(|e| {
                eprintln!("Output error: {}", e);
                std::process::exit(1);
            });
        }
    }

    let warnings = circuit.reporter().diagnostics().iter().filter(|d| d.severity == Severity::Warning).count();
    if warnings > 0 {
        eprintln!("{} warning(s) reported", warnings);
    }
    if cli.stats {
        circuit.ctx.stats.display();
    }
}
