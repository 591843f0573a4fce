//! Pole-zero probe: `Y(s) = G + sC` at caller-supplied complex frequencies.
//!
//! A unit current is injected into the input node pair. At each point
//! the probe records the voltage across the output node pair (the
//! transimpedance) and the determinant of `Y(s)`. Poles are the zeros of
//! the determinant; a root finder can drive the probe one point at a
//! time.

use super::op::operating_point;
use super::{Analysis, OutputSink, PauseFlag, PlotId, PlotMeta, RunStatus};
use crate::circuit::Circuit;
use crate::context::{AnalysisMode, InitPhase};
use crate::error::{NodalError, Result};
use crate::report::Severity;
use num_complex::Complex64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PzSample {
    pub s: Complex64,
    pub transfer: Complex64,
    pub determinant: Complex64,
}

#[derive(Debug, Clone)]
pub struct PoleZeroProbe {
    input: (String, String),
    output: (String, String),
    points: Vec<Complex64>,
    samples: Vec<PzSample>,
    /// Unknown indices of input +/- and output +/-.
    ports: Option<[usize; 4]>,
    plot: Option<PlotId>,
}

impl PoleZeroProbe {
    pub fn new(input: (&str, &str), output: (&str, &str), points: Vec<Complex64>) -> Self {
        Self {
            input: (input.0.to_string(), input.1.to_string()),
            output: (output.0.to_string(), output.1.to_string()),
            points,
            samples: Vec::new(),
            ports: None,
            plot: None,
        }
    }

    pub fn samples(&self) -> &[PzSample] {
        &self.samples
    }

    /// Operating point and small-signal load; resolves the port nodes.
    pub fn prepare(&mut self, circuit: &mut Circuit) -> Result<()> {
        circuit.require("pole-zero", |c| c.pz)?;
        operating_point(circuit, AnalysisMode::DcOp)?;
        circuit.ctx.phase = InitPhase::SmallSignal;
        circuit.load()?;
        circuit.ctx.mode = AnalysisMode::PoleZero;
        circuit.matrix.reorder();

        let find = |name: &str| {
            circuit
                .nodes()
                .find(name)
                .ok_or_else(|| NodalError::Analysis(format!("pole-zero port node '{name}' does not exist")))
        };
        self.ports = Some([
            find(&self.input.0)?,
            find(&self.input.1)?,
            find(&self.output.0)?,
            find(&self.output.1)?,
        ]);
        Ok(())
    }

    /// Evaluate one complex frequency. Requires [`prepare`](Self::prepare).
    pub fn evaluate(&self, circuit: &mut Circuit, s: Complex64) -> Result<PzSample> {
        let [in_p, in_n, out_p, out_n] = self
            .ports
            .ok_or_else(|| NodalError::Analysis("pole-zero probe used before prepare".into()))?;
        circuit.pz_load(s)?;
        let mut rhs = vec![Complex64::new(0.0, 0.0); circuit.ctx.num_unknowns() + 1];
        rhs[in_p] += 1.0;
        rhs[in_n] -= 1.0;
        circuit.matrix.factor_and_solve_complex(&mut rhs)?;
        circuit.ctx.stats.linear_solves += 1;
        Ok(PzSample {
            s,
            transfer: rhs[out_p] - rhs[out_n],
            determinant: circuit.matrix.complex_determinant(),
        })
    }
}

impl Analysis for PoleZeroProbe {
    fn name(&self) -> &'static str {
        "pz"
    }

    fn run(&mut self, circuit: &mut Circuit, sink: &mut dyn OutputSink, pause: &PauseFlag) -> Result<RunStatus> {
        let _span = tracing::info_span!("pz_probe", points = self.points.len()).entered();
        let plot = match self.plot {
            Some(p) => p,
            None => {
                self.prepare(circuit)?;
                self.samples.clear();
                let p = sink.begin_plot(PlotMeta {
                    analysis: "pz",
                    title: "Pole-zero probe".to_string(),
                    scale: "point".to_string(),
                    vectors: vec!["s".into(), "transfer".into(), "det".into()],
                    complex: true,
                });
                self.plot = Some(p);
                p
            }
        };

        while self.samples.len() < self.points.len() {
            if pause.take() {
                return Ok(RunStatus::Paused);
            }
            let index = self.samples.len();
            let s = self.points[index];
            let sample = match self.evaluate(circuit, s) {
                Ok(sample) => sample,
                // Y(s) is singular exactly at a pole.
                Err(e @ NodalError::SingularMatrix { .. }) => {
                    let msg = format!("Y(s) singular at s = {s}: {e}");
                    circuit.reporter_mut().report(Severity::Warning, "pz", &msg);
                    PzSample {
                        s,
                        transfer: Complex64::new(f64::INFINITY, 0.0),
                        determinant: Complex64::new(0.0, 0.0),
                    }
                }
                Err(e) => return Err(e),
            };
            sink.dump_complex(plot, index as f64, &[sample.s, sample.transfer, sample.determinant]);
            self.samples.push(sample);
        }
        self.plot = None;
        Ok(RunStatus::Completed)
    }
}
