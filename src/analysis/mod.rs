//! Analysis drivers and the output plumbing they share.
//!
//! Every driver is a resumable job implementing [`Analysis`]. Results go
//! to an [`OutputSink`]: one [`OutputSink::begin_plot`] per run, then one
//! dump per accepted point. A [`PauseFlag`] is polled once per outer
//! iteration; a paused job returns [`RunStatus::Paused`] and the next
//! call to `run` continues after the last completed point.

pub mod ac;
pub mod dc;
pub mod op;
pub mod pz;
pub mod transient;

use crate::circuit::Circuit;
use crate::error::Result;
use num_complex::Complex64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// Stopped on request; calling `run` again resumes.
    Paused,
}

/// Cooperative pause request shared between a job and its controller.
#[derive(Debug, Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume a pending request.
    pub(crate) fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlotId(pub usize);

/// Description of one result set.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotMeta {
    /// Analysis that produced the plot (`op`, `dc`, `ac`, `tran`, `pz`).
    pub analysis: &'static str,
    pub title: String,
    /// Name of the independent variable.
    pub scale: String,
    /// Names of the dumped vectors, in dump order.
    pub vectors: Vec<String>,
    pub complex: bool,
}

/// Receives analysis results point by point.
pub trait OutputSink {
    fn begin_plot(&mut self, meta: PlotMeta) -> PlotId;

    fn dump_real(&mut self, plot: PlotId, scale: f64, values: &[f64]);

    fn dump_complex(&mut self, plot: PlotId, scale: f64, values: &[Complex64]);
}

/// A resumable analysis job.
pub trait Analysis {
    fn name(&self) -> &'static str;

    fn run(&mut self, circuit: &mut Circuit, sink: &mut dyn OutputSink, pause: &PauseFlag) -> Result<RunStatus>;
}

/// One recorded result set.
#[derive(Debug, Clone)]
pub struct Plot {
    pub meta: PlotMeta,
    pub scale: Vec<f64>,
    pub real: Vec<Vec<f64>>,
    pub complex: Vec<Vec<Complex64>>,
}

impl Plot {
    pub fn len(&self) -> usize {
        self.scale.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scale.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.meta.vectors.iter().position(|v| v == name)
    }

    /// All recorded values of a real vector.
    pub fn real_vector(&self, name: &str) -> Option<Vec<f64>> {
        let i = self.position(name)?;
        Some(self.real.iter().map(|row| row[i]).collect())
    }

    pub fn complex_vector(&self, name: &str) -> Option<Vec<Complex64>> {
        let i = self.position(name)?;
        Some(self.complex.iter().map(|row| row[i]).collect())
    }
}

/// In-memory [`OutputSink`].
#[derive(Debug, Default)]
pub struct Recorder {
    plots: Vec<Plot>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plots(&self) -> &[Plot] {
        &self.plots
    }

    pub fn plot(&self, id: PlotId) -> Option<&Plot> {
        self.plots.get(id.0)
    }

    pub fn last(&self) -> Option<&Plot> {
        self.plots.last()
    }
}

impl OutputSink for Recorder {
    fn begin_plot(&mut self, meta: PlotMeta) -> PlotId {
        self.plots.push(Plot {
            meta,
            scale: Vec::new(),
            real: Vec::new(),
            complex: Vec::new(),
        });
        PlotId(self.plots.len() - 1)
    }

    fn dump_real(&mut self, plot: PlotId, scale: f64, values: &[f64]) {
        if let Some(p) = self.plots.get_mut(plot.0) {
            p.scale.push(scale);
            p.real.push(values.to_vec());
        }
    }

    fn dump_complex(&mut self, plot: PlotId, scale: f64, values: &[Complex64]) {
        if let Some(p) = self.plots.get_mut(plot.0) {
            p.scale.push(scale);
            p.complex.push(values.to_vec());
        }
    }
}

/// Open a plot whose vectors are the circuit unknowns.
fn begin_solution_plot(
    circuit: &Circuit,
    sink: &mut dyn OutputSink,
    analysis: &'static str,
    title: &str,
    scale: &str,
    complex: bool,
) -> PlotId {
    sink.begin_plot(PlotMeta {
        analysis,
        title: title.to_string(),
        scale: scale.to_string(),
        vectors: circuit.labels(),
        complex,
    })
}

/// Dump the present real solution, ground excluded.
fn dump_solution(circuit: &Circuit, sink: &mut dyn OutputSink, plot: PlotId, scale: f64) {
    sink.dump_real(plot, scale, &circuit.ctx.rhs_old[1..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_collects_columns() {
        let mut rec = Recorder::new();
        let id = rec.begin_plot(PlotMeta {
            analysis: "tran",
            title: "t".into(),
            scale: "time".into(),
            vectors: vec!["V(a)".into(), "V(b)".into()],
            complex: false,
        });
        rec.dump_real(id, 0.0, &[1.0, 2.0]);
        rec.dump_real(id, 1.0, &[3.0, 4.0]);
        let plot = rec.plot(id).unwrap();
        assert_eq!(plot.len(), 2);
        assert_eq!(plot.real_vector("V(b)").unwrap(), vec![2.0, 4.0]);
        assert!(plot.real_vector("V(c)").is_none());
    }

    #[test]
    fn pause_request_is_consumed() {
        let flag = PauseFlag::new();
        let remote = flag.clone();
        remote.request();
        assert!(flag.is_requested());
        assert!(flag.take());
        assert!(!flag.take());
    }
}
