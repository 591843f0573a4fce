use super::waveform::Waveform;
use super::{bad_param, no_instance, Device, DeviceKind, Setup};
use crate::context::{AnalysisMode, SimContext};
use crate::error::Result;
use crate::matrix::{MatrixHandle, SparseMatrix};
use num_complex::Complex64;

#[derive(Debug, Clone, Copy)]
struct Handles {
    pos_br: MatrixHandle,
    neg_br: MatrixHandle,
    br_pos: MatrixHandle,
    br_neg: MatrixHandle,
}

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    terminals: [String; 2],
    dc: f64,
    ac_mag: f64,
    ac_phase: f64,
    waveform: Option<Waveform>,
    branch: usize,
    handles: Option<Handles>,
}

/// Independent voltage sources. Each adds a branch-current unknown.
#[derive(Debug, Clone)]
pub struct VoltageSource {
    name: String,
    instances: Vec<Instance>,
}

impl VoltageSource {
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
            branch: 0,
            handles: None,
        });
        self
    }

    /// Attach a transient waveform to the most recently added instance.
    pub fn with_waveform(&mut self, waveform: Waveform) -> &mut Self {
        if let Some(inst) = self.instances.last_mut() {
            inst.waveform = Some(waveform);
        }
        self
    }

    /// Set the AC excitation of the most recently added instance.
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

    /// Branch-current unknown of an instance, once set up.
    pub fn branch_of(&self, instance: &str) -> Option<usize> {
        self.instances.iter().find(|i| i.name == instance).map(|i| i.branch)
    }
}

impl Instance {
    fn value(&self, ctx: &SimContext) -> f64 {
        let v = match (ctx.mode, &self.waveform) {
            (AnalysisMode::DcOp | AnalysisMode::DcSweep, _) | (_, None) => self.dc,
            (AnalysisMode::TranOp, Some(w)) => w.value(0.0),
            (_, Some(w)) => w.value(ctx.time),
        };
        v * ctx.src_fact
    }
}

impl Device for VoltageSource {
    fn kind(&self) -> DeviceKind {
        DeviceKind::VoltageSource
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
            let p = setup.node(&inst.terminals[0]);
            let n = setup.node(&inst.terminals[1]);
            let k = setup.branch(&inst.name);
            inst.branch = k;
            inst.handles = Some(Handles {
                pos_br: setup.allocate(p, k),
                neg_br: setup.allocate(n, k),
                br_pos: setup.allocate(k, p),
                br_neg: setup.allocate(k, n),
            });
        }
        Ok(())
    }

    fn load(&mut self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            let Some(h) = &inst.handles else { continue };
            matrix.add(h.pos_br, 1.0);
            matrix.add(h.neg_br, -1.0);
            matrix.add(h.br_pos, 1.0);
            matrix.add(h.br_neg, -1.0);
            ctx.rhs[inst.branch] += inst.value(ctx);
        }
        Ok(())
    }

    fn ac_load(&self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        self.pz_load(Complex64::new(0.0, ctx.omega), matrix)?;
        for inst in &self.instances {
            ctx.ac_rhs[inst.branch] += Complex64::from_polar(inst.ac_mag, inst.ac_phase.to_radians());
        }
        Ok(())
    }

    fn pz_load(&self, _s: Complex64, matrix: &mut SparseMatrix) -> Result<()> {
        let one = Complex64::new(1.0, 0.0);
        for inst in &self.instances {
            let Some(h) = &inst.handles else { continue };
            matrix.add_complex(h.pos_br, one);
            matrix.add_complex(h.neg_br, -one);
            matrix.add_complex(h.br_pos, one);
            matrix.add_complex(h.br_neg, -one);
        }
        Ok(())
    }
}
