use super::{bad_param, no_instance, Device, DeviceKind, PairStamp, Setup};
use crate::context::{AnalysisMode, InitPhase, SimContext};
use crate::error::{NodalError, Result};
use crate::matrix::SparseMatrix;
use crate::report::{Reporter, Severity};
use num_complex::Complex64;

const CHARGE: usize = 0;

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    terminals: [String; 2],
    capacitance: f64,
    ic: Option<f64>,
    nodes: [usize; 2],
    stamp: Option<PairStamp>,
    /// Charge and companion current slots.
    state: usize,
}

/// Linear capacitors.
#[derive(Debug, Clone)]
pub struct Capacitor {
    name: String,
    instances: Vec<Instance>,
}

impl Capacitor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instances: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, pos: &str, neg: &str, capacitance: f64) -> &mut Self {
        self.instances.push(Instance {
            name: name.to_string(),
            terminals: [pos.to_string(), neg.to_string()],
            capacitance,
            ic: None,
            nodes: [0; 2],
            stamp: None,
            state: 0,
        });
        self
    }
}

impl Device for Capacitor {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Capacitor
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
            "c" | "capacitance" => inst.capacitance = value,
            "ic" => inst.ic = Some(value),
            _ => return Err(bad_param(instance, param)),
        }
        Ok(())
    }

    fn setup(&mut self, setup: &mut Setup<'_>) -> Result<()> {
        for inst in &mut self.instances {
            inst.nodes = [setup.node(&inst.terminals[0]), setup.node(&inst.terminals[1])];
            inst.stamp = Some(PairStamp::new(setup, inst.nodes[0], inst.nodes[1]));
            inst.state = setup.states(2);
        }
        Ok(())
    }

    fn check_model(&mut self, reporter: &mut dyn Reporter) -> Result<()> {
        for inst in &self.instances {
            if !inst.capacitance.is_finite() {
                let reason = format!("capacitance = {} is not finite", inst.capacitance);
                reporter.report(Severity::Fatal, &inst.name, &reason);
                return Err(NodalError::ParameterFatal { device: inst.name.clone(), reason });
            }
        }
        Ok(())
    }

    fn load(&mut self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        if !matches!(ctx.mode, AnalysisMode::Transient | AnalysisMode::TranOp) {
            return Ok(());
        }
        for inst in &self.instances {
            let [p, n] = inst.nodes;
            let v = match (ctx.mode, ctx.uic, inst.ic) {
                (AnalysisMode::TranOp, true, Some(ic)) => ic,
                _ => ctx.voltage(p) - ctx.voltage(n),
            };
            let q = inst.state + CHARGE;
            ctx.state0[q] = inst.capacitance * v;
            if ctx.mode != AnalysisMode::Transient {
                continue;
            }
            if ctx.phase == InitPhase::Transient {
                let q0 = ctx.state0[q];
                ctx.state1_mut()[q] = q0;
            }
            let (geq, ceq) = ctx.integrate(q, inst.capacitance);
            if ctx.phase == InitPhase::Transient {
                let i0 = ctx.state0[q + 1];
                ctx.state1_mut()[q + 1] = i0;
            }
            if let Some(stamp) = &inst.stamp {
                stamp.add(matrix, geq);
            }
            ctx.rhs[p] -= ceq;
            ctx.rhs[n] += ceq;
        }
        Ok(())
    }

    fn ac_load(&self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        self.pz_load(Complex64::new(0.0, ctx.omega), matrix)
    }

    fn pz_load(&self, s: Complex64, matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            if let Some(stamp) = &inst.stamp {
                stamp.add_complex(matrix, s * inst.capacitance);
            }
        }
        Ok(())
    }

    fn get_ic(&mut self, ctx: &SimContext) {
        for inst in &mut self.instances {
            if inst.ic.is_none() {
                inst.ic = Some(ctx.voltage(inst.nodes[0]) - ctx.voltage(inst.nodes[1]));
            }
        }
    }

    fn trunc(&self, ctx: &SimContext, step: &mut f64) {
        for inst in &self.instances {
            *step = step.min(ctx.truncation_step(inst.state + CHARGE));
        }
    }
}
