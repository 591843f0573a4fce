use super::waveform::Waveform;
use super::{bad_param, no_instance, Device, DeviceKind, Setup};
use crate::context::{AnalysisMode, SimContext};
use crate::error::Result;
use crate::matrix::SparseMatrix;
use num_complex::Complex64;

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    terminals: [String; 2],
    dc: f64,
    ac_mag: f64,
    ac_phase: f64,
    waveform: Option<Waveform>,
    nodes: [usize; 2],
}

/// Independent current sources. Positive current flows from the
/// positive terminal through the source to the negative terminal.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    name: String,
    instances: Vec<Instance>,
}

impl CurrentSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instances: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, pos: &str, neg: &str, dc: f64) -> &mut Self {
        self.instances.push(Instance {
            name: name.to_string(),
            terminals: [pos.to_string(), neg.to_string()],
            dc,
            ac_mag: 0.0,
            ac_phase: 0.0,
            waveform: None,
            nodes: [0; 2],
        });
        self
    }

    pub fn with_waveform(&mut self, waveform: Waveform) -> &mut Self {
        if let Some(inst) = self.instances.last_mut() {
            inst.waveform = Some(waveform);
        }
        self
    }

    pub fn with_ac(&mut self, magnitude: f64, phase_deg: f64) -> &mut Self {
        if let Some(inst) = self.instances.last_mut() {
            inst.ac_mag = magnitude;
            inst.ac_phase = phase_deg;
        }
        self
    }

    pub fn set_waveform(&mut self, instance: &str, waveform: Waveform) -> Result<()> {
        let inst = self
            .instances
            .iter_mut()
            .find(|i| i.name == instance)
            .ok_or_else(|| no_instance(&self.name, instance))?;
        inst.waveform = Some(waveform);
        Ok(())
    }
}

impl Device for CurrentSource {
    fn kind(&self) -> DeviceKind {
        DeviceKind::CurrentSource
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn instance_names(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name.as_str()).collect()
    }

    fn set_instance_param(&mut self, instance: &str, param: &str, value: f64) -> Result<()> {
        let inst = self
            .instances
            .iter_mut()
            .find(|i| i.name == instance)
            .ok_or_else(|| no_instance(&self.name, instance))?;
        match param {
            "dc" => inst.dc = value,
            "acmag" => inst.ac_mag = value,
            "acphase" => inst.ac_phase = value,
            _ => return Err(bad_param(instance, param)),
        }
        Ok(())
    }

    fn ask(&self, instance: &str, param: &str) -> Option<f64> {
        let inst = self.instances.iter().find(|i| i.name == instance)?;
        match param {
            "dc" => Some(inst.dc),
            "acmag" => Some(inst.ac_mag),
            "acphase" => Some(inst.ac_phase),
            _ => None,
        }
    }

    fn setup(&mut self, setup: &mut Setup<'_>) -> Result<()> {
        for inst in &mut self.instances {
            inst.nodes = [setup.node(&inst.terminals[0]), setup.node(&inst.terminals[1])];
        }
        Ok(())
    }

    fn load(&mut self, ctx: &mut SimContext, _matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            let value = match (ctx.mode, &inst.waveform) {
                (AnalysisMode::DcOp | AnalysisMode::DcSweep, _) | (_, None) => inst.dc,
                (AnalysisMode::TranOp, Some(w)) => w.value(0.0),
                (_, Some(w)) => w.value(ctx.time),
            } * ctx.src_fact;
            let [p, n] = inst.nodes;
            ctx.rhs[p] -= value;
            ctx.rhs[n] += value;
        }
        Ok(())
    }

    fn ac_load(&self, ctx: &mut SimContext, _matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            let value = Complex64::from_polar(inst.ac_mag, inst.ac_phase.to_radians());
            let [p, n] = inst.nodes;
            ctx.ac_rhs[p] -= value;
            ctx.ac_rhs[n] += value;
        }
        Ok(())
    }

    fn pz_load(&self, _s: Complex64, _matrix: &mut SparseMatrix) -> Result<()> {
        Ok(())
    }
}
