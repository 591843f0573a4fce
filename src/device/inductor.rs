use super::{bad_param, no_instance, Device, DeviceKind, Setup};
use crate::context::{AnalysisMode, InitPhase, SimContext};
use crate::error::{NodalError, Result};
use crate::matrix::{MatrixHandle, SparseMatrix};
use crate::report::{Reporter, Severity};
use num_complex::Complex64;

const FLUX: usize = 0;

#[derive(Debug, Clone, Copy)]
struct Handles {
    pos_br: MatrixHandle,
    neg_br: MatrixHandle,
    br_pos: MatrixHandle,
    br_neg: MatrixHandle,
    br_br: MatrixHandle,
}

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    terminals: [String; 2],
    inductance: f64,
    ic: Option<f64>,
    nodes: [usize; 2],
    branch: usize,
    handles: Option<Handles>,
    state: usize,
}

/// Linear inductors. Each adds a branch-current unknown.
#[derive(Debug, Clone)]
pub struct Inductor {
    name: String,
    instances: Vec<Instance>,
}

impl Inductor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instances: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, pos: &str, neg: &str, inductance: f64) -> &mut Self {
        self.instances.push(Instance {
            name: name.to_string(),
            terminals: [pos.to_string(), neg.to_string()],
            inductance,
            ic: None,
            nodes: [0; 2],
            branch: 0,
            handles: None,
            state: 0,
        });
        self
    }

    fn stamp_incidence(h: &Handles, matrix: &mut SparseMatrix) {
        matrix.add(h.pos_br, 1.0);
        matrix.add(h.neg_br, -1.0);
        matrix.add(h.br_pos, 1.0);
        matrix.add(h.br_neg, -1.0);
    }
}

impl Device for Inductor {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Inductor
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
            "l" | "inductance" => inst.inductance = value,
            "ic" => inst.ic = Some(value),
            _ => return Err(bad_param(instance, param)),
        }
        Ok(())
    }

    fn setup(&mut self, setup: &mut Setup<'_>) -> Result<()> {
        for inst in &mut self.instances {
            let p = setup.node(&inst.terminals[0]);
            let n = setup.node(&inst.terminals[1]);
            let k = setup.branch(&inst.name);
            inst.nodes = [p, n];
            inst.branch = k;
            inst.handles = Some(Handles {
                pos_br: setup.allocate(p, k),
                neg_br: setup.allocate(n, k),
                br_pos: setup.allocate(k, p),
                br_neg: setup.allocate(k, n),
                br_br: setup.allocate(k, k),
            });
            inst.state = setup.states(2);
        }
        Ok(())
    }

    fn check_model(&mut self, reporter: &mut dyn Reporter) -> Result<()> {
        for inst in &self.instances {
            if !inst.inductance.is_finite() {
                let reason = format!("inductance = {} is not finite", inst.inductance);
                reporter.report(Severity::Fatal, &inst.name, &reason);
                return Err(NodalError::ParameterFatal { device: inst.name.clone(), reason });
            }
        }
        Ok(())
    }

    fn load(&mut self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            let Some(h) = &inst.handles else { continue };
            Self::stamp_incidence(h, matrix);
            if ctx.mode.is_dc() && ctx.mode != AnalysisMode::TranOp {
                continue;
            }
            let flux = inst.state + FLUX;
            let current = match (ctx.mode, ctx.uic, inst.ic) {
                (AnalysisMode::TranOp, true, Some(ic)) => ic,
                _ => ctx.voltage(inst.branch),
            };
            ctx.state0[flux] = inst.inductance * current;
            if ctx.mode != AnalysisMode::Transient {
                continue;
            }
            if ctx.phase == InitPhase::Transient {
                let f0 = ctx.state0[flux];
                ctx.state1_mut()[flux] = f0;
            }
            let (req, veq) = ctx.integrate(flux, inst.inductance);
            if ctx.phase == InitPhase::Transient {
                let v0 = ctx.state0[flux + 1];
                ctx.state1_mut()[flux + 1] = v0;
            }
            matrix.add(h.br_br, -req);
            ctx.rhs[inst.branch] += veq;
        }
        Ok(())
    }

    fn ac_load(&self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        self.pz_load(Complex64::new(0.0, ctx.omega), matrix)
    }

    fn pz_load(&self, s: Complex64, matrix: &mut SparseMatrix) -> Result<()> {
        let one = Complex64::new(1.0, 0.0);
        for inst in &self.instances {
            let Some(h) = &inst.handles else { continue };
            matrix.add_complex(h.pos_br, one);
            matrix.add_complex(h.neg_br, -one);
            matrix.add_complex(h.br_pos, one);
            matrix.add_complex(h.br_neg, -one);
            matrix.add_complex(h.br_br, -s * inst.inductance);
        }
        Ok(())
    }

    fn get_ic(&mut self, ctx: &SimContext) {
        for inst in &mut self.instances {
            if inst.ic.is_none() {
                inst.ic = Some(ctx.voltage(inst.branch));
            }
        }
    }

    fn trunc(&self, ctx: &SimContext, step: &mut f64) {
        for inst in &self.instances {
            *step = step.min(ctx.truncation_step(inst.state + FLUX));
        }
    }
}
