use super::{bad_param, no_instance, Device, DeviceKind, PairStamp, Setup};
use crate::context::SimContext;
use crate::error::{NodalError, Result};
use crate::matrix::SparseMatrix;
use crate::report::{Reporter, Severity};
use num_complex::Complex64;

#[derive(Debug, Clone)]
struct Instance {
    name: String,
    terminals: [String; 2],
    resistance: f64,
    stamp: Option<PairStamp>,
}

/// Linear resistors.
#[derive(Debug, Clone)]
pub struct Resistor {
    name: String,
    instances: Vec<Instance>,
}

impl Resistor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            instances: Vec::new(),
        }
    }

    pub fn add(&mut self, name: &str, pos: &str, neg: &str, resistance: f64) -> &mut Self {
        self.instances.push(Instance {
            name: name.to_string(),
            terminals: [pos.to_string(), neg.to_string()],
            resistance,
            stamp: None,
        });
        self
    }
}

impl Device for Resistor {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Resistor
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
            "r" | "resistance" => inst.resistance = value,
            _ => return Err(bad_param(instance, param)),
        }
        Ok(())
    }

    fn setup(&mut self, setup: &mut Setup<'_>) -> Result<()> {
        for inst in &mut self.instances {
            let p = setup.node(&inst.terminals[0]);
            let n = setup.node(&inst.terminals[1]);
            inst.stamp = Some(PairStamp::new(setup, p, n));
        }
        Ok(())
    }

    fn check_model(&mut self, reporter: &mut dyn Reporter) -> Result<()> {
        for inst in &self.instances {
            if inst.resistance == 0.0 || !inst.resistance.is_finite() {
                let reason = format!("resistance = {} is not usable", inst.resistance);
                reporter.report(Severity::Fatal, &inst.name, &reason);
                return Err(NodalError::ParameterFatal {
                    device: inst.name.clone(),
                    reason,
                });
            }
        }
        Ok(())
    }

    fn load(&mut self, _ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            if let Some(stamp) = &inst.stamp {
                stamp.add(matrix, 1.0 / inst.resistance);
            }
        }
        Ok(())
    }

    fn ac_load(&self, _ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()> {
        self.pz_load(Complex64::new(0.0, 0.0), matrix)
    }

    fn pz_load(&self, _s: Complex64, matrix: &mut SparseMatrix) -> Result<()> {
        for inst in &self.instances {
            if let Some(stamp) = &inst.stamp {
                stamp.add_complex(matrix, Complex64::new(1.0 / inst.resistance, 0.0));
            }
        }
        Ok(())
    }
}
