//! The elaborated circuit: unknown numbering, registered devices, the
//! stamping matrix and the simulation context.
//!
//! Devices are registered as model objects carrying their instances.
//! [`Circuit::setup`] numbers nodes and branch unknowns, freezes the
//! matrix structure, sizes the context vectors and runs the temperature
//! and model checks. Analyses call setup implicitly.

use crate::context::{SimContext, UnknownKind};
use crate::device::{Capabilities, Device, DeviceKind, Setup};
use crate::error::{NodalError, Result};
use crate::matrix::{MatrixHandle, SparseMatrix};
use crate::options::SimOptions;
use crate::report::{Reporter, TracingReporter};
use std::collections::HashMap;
use std::time::Instant;

/// Names and kinds of the unknowns. Index 0 is ground.
#[derive(Debug, Clone)]
pub struct NodeTable {
    names: Vec<String>,
    kinds: Vec<UnknownKind>,
    index: HashMap<String, usize>,
}

impl Default for NodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeTable {
    pub fn new() -> Self {
        Self {
            names: vec!["0".to_string()],
            kinds: vec![UnknownKind::Voltage],
            index: HashMap::new(),
        }
    }

    fn is_ground(name: &str) -> bool {
        name == "0" || name.eq_ignore_ascii_case("gnd")
    }

    /// Index of the named node, created on first reference.
    pub fn node(&mut self, name: &str) -> usize {
        if Self::is_ground(name) {
            return 0;
        }
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        self.push(name.to_string(), UnknownKind::Voltage)
    }

    /// A node no other element can reference by name.
    pub fn internal(&mut self, name: &str) -> usize {
        self.names.push(name.to_string());
        self.kinds.push(UnknownKind::Voltage);
        self.names.len() - 1
    }

    /// A branch-current unknown owned by `owner`.
    pub fn branch(&mut self, owner: &str) -> usize {
        self.push(format!("{owner}#branch"), UnknownKind::Current)
    }

    fn push(&mut self, name: String, kind: UnknownKind) -> usize {
        let i = self.names.len();
        self.index.insert(name.clone(), i);
        self.names.push(name);
        self.kinds.push(kind);
        i
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        if Self::is_ground(name) {
            return Some(0);
        }
        self.index.get(name).copied()
    }

    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn kind(&self, index: usize) -> UnknownKind {
        self.kinds[index]
    }

    pub fn kinds(&self) -> &[UnknownKind] {
        &self.kinds
    }

    /// Number of entries including ground.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() == 1
    }

    /// Output label of an unknown: `V(node)` or `I(owner)`.
    pub fn label(&self, index: usize) -> String {
        match self.kinds[index] {
            UnknownKind::Voltage => format!("V({})", self.names[index]),
            UnknownKind::Current => {
                let owner = self.names[index].trim_end_matches("#branch");
                format!("I({owner})")
            }
        }
    }
}

#[derive(Debug)]
pub struct Circuit {
    nodes: NodeTable,
    devices: Vec<Box<dyn Device>>,
    pub ctx: SimContext,
    pub matrix: SparseMatrix,
    reporter: Box<dyn Reporter>,
    /// Diagonal cells of every voltage unknown, for gmin stepping.
    diag: Vec<MatrixHandle>,
    elaborated: bool,
}

impl Circuit {
    pub fn new(options: SimOptions) -> Self {
        Self::with_reporter(options, Box::new(TracingReporter))
    }

    pub fn with_reporter(options: SimOptions, reporter: Box<dyn Reporter>) -> Self {
        let matrix = SparseMatrix::new(options.backend, options.pivrel, options.pivtol);
        Self {
            nodes: NodeTable::new(),
            devices: Vec::new(),
            ctx: SimContext::new(options),
            matrix,
            reporter,
            diag: Vec::new(),
            elaborated: false,
        }
    }

    /// Register a model object. Model names must be unique.
    pub fn add_device(&mut self, device: Box<dyn Device>) -> Result<()> {
        if self.device(device.name()).is_some() {
            return Err(NodalError::Setup(format!("duplicate model name '{}'", device.name())));
        }
        self.devices.push(device);
        self.elaborated = false;
        Ok(())
    }

    pub fn add<D: Device + 'static>(&mut self, device: D) -> Result<()> {
        self.add_device(Box::new(device))
    }

    pub fn device(&self, name: &str) -> Option<&dyn Device> {
        self.devices.iter().find(|d| d.name() == name).map(|d| d.as_ref())
    }

    pub fn devices(&self) -> impl Iterator<Item = &dyn Device> {
        self.devices.iter().map(|d| d.as_ref())
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut Box<dyn Device>> {
        self.devices.iter_mut().find(|d| d.name() == name)
    }

    pub fn set_model_param(&mut self, model: &str, param: &str, value: f64) -> Result<()> {
        let device = self
            .device_mut(model)
            .ok_or_else(|| NodalError::Setup(format!("no model named '{model}'")))?;
        device.set_model_param(param, value)?;
        self.elaborated = false;
        Ok(())
    }

    /// Set a parameter on the named instance, whichever model owns it.
    pub fn set_instance_param(&mut self, instance: &str, param: &str, value: f64) -> Result<()> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.instance_names().contains(&instance))
            .ok_or_else(|| NodalError::Setup(format!("no instance named '{instance}'")))?;
        device.set_instance_param(instance, param, value)?;
        self.elaborated = false;
        Ok(())
    }

    pub fn instance_param(&self, instance: &str, param: &str) -> Option<f64> {
        self.devices
            .iter()
            .find(|d| d.instance_names().contains(&instance))
            .and_then(|d| d.ask(instance, param))
    }

    /// Change the DC value of an independent source without a fresh
    /// elaboration, keeping the present solution as the next initial guess.
    pub fn set_source_value(&mut self, instance: &str, value: f64) -> Result<()> {
        let device = self
            .devices
            .iter_mut()
            .find(|d| d.instance_names().contains(&instance))
            .ok_or_else(|| NodalError::Setup(format!("no instance named '{instance}'")))?;
        if !matches!(device.kind(), DeviceKind::VoltageSource | DeviceKind::CurrentSource) {
            return Err(NodalError::Analysis(format!("'{instance}' is not an independent source")));
        }
        device.set_instance_param(instance, "dc", value)
    }

    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    pub fn reporter_mut(&mut self) -> &mut dyn Reporter {
        self.reporter.as_mut()
    }

    pub fn options(&self) -> &SimOptions {
        &self.ctx.options
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Elaborate the circuit if anything changed since the last setup.
    ///
    /// Parameter edits made after a setup take effect through a fresh
    /// elaboration; the solution vectors are reset.
    pub fn setup(&mut self) -> Result<()> {
        if self.elaborated {
            return Ok(());
        }
        let start = Instant::now();
        let opts = &self.ctx.options;
        let mut nodes = NodeTable::new();
        let mut matrix = SparseMatrix::new(opts.backend, opts.pivrel, opts.pivtol);
        let mut num_states = 0;
        {
            let mut setup = Setup {
                nodes: &mut nodes,
                matrix: &mut matrix,
                num_states: &mut num_states,
            };
            for device in &mut self.devices {
                device.setup(&mut setup)?;
            }
        }
        self.diag = (1..nodes.len())
            .filter(|&i| nodes.kind(i) == UnknownKind::Voltage)
            .map(|i| matrix.allocate(i, i))
            .collect();
        matrix.finalize(nodes.len() - 1)?;
        self.ctx.allocate(nodes.kinds().to_vec(), num_states);
        self.nodes = nodes;
        self.matrix = matrix;

        for device in &mut self.devices {
            device.temperature(&self.ctx.options)?;
        }
        for device in &mut self.devices {
            device.check_model(self.reporter.as_mut())?;
        }
        self.elaborated = true;
        tracing::debug!(
            unknowns = self.ctx.num_unknowns(),
            states = num_states,
            devices = self.devices.len(),
            "circuit elaborated"
        );
        self.ctx.stats.add_phase("Setup", start.elapsed());
        Ok(())
    }

    /// Fail if any registered device lacks a capability an analysis needs.
    pub fn require(&self, analysis: &'static str, needs: fn(Capabilities) -> bool) -> Result<()> {
        match self.devices.iter().find(|d| !needs(d.capabilities())) {
            Some(d) => Err(NodalError::DeviceTypeUnsupported {
                device: d.kind().name().to_string(),
                analysis,
            }),
            None => Ok(()),
        }
    }

    /// Zero the real system and stamp every device at the present iterate.
    pub fn load(&mut self) -> Result<()> {
        self.matrix.clear_real();
        self.ctx.rhs.iter_mut().for_each(|v| *v = 0.0);
        self.ctx.noncon = 0;
        for device in &mut self.devices {
            device.load(&mut self.ctx, &mut self.matrix)?;
        }
        if self.ctx.diag_gmin > 0.0 {
            for &h in &self.diag {
                self.matrix.add(h, self.ctx.diag_gmin);
            }
        }
        Ok(())
    }

    /// Device convergence tests in registration order; stops at the first
    /// failing device.
    pub fn conv_test(&mut self) -> bool {
        self.devices.iter().all(|d| d.conv_test(&mut self.ctx))
    }

    /// Zero the complex system and stamp `G + jωC` with AC excitations.
    pub fn ac_load(&mut self) -> Result<()> {
        self.matrix.clear_complex();
        self.ctx.ac_rhs.iter_mut().for_each(|v| *v = Default::default());
        for device in &self.devices {
            device.ac_load(&mut self.ctx, &mut self.matrix)?;
        }
        Ok(())
    }

    /// Zero the complex system and stamp `G + sC`.
    pub fn pz_load(&mut self, s: num_complex::Complex64) -> Result<()> {
        self.matrix.clear_complex();
        for device in &self.devices {
            device.pz_load(s, &mut self.matrix)?;
        }
        Ok(())
    }

    pub fn get_ic(&mut self) {
        for device in &mut self.devices {
            device.get_ic(&self.ctx);
        }
    }

    /// Smallest step every device's truncation error allows, starting
    /// from `step`.
    pub fn trunc(&self, step: f64) -> f64 {
        let mut step = step;
        for device in &self.devices {
            device.trunc(&self.ctx, &mut step);
        }
        step
    }

    /// Voltage of a named node in the last solution.
    pub fn node_voltage(&self, name: &str) -> Option<f64> {
        self.nodes.find(name).map(|i| self.ctx.rhs_old[i])
    }

    /// Current through the branch unknown owned by `owner`.
    pub fn branch_current(&self, owner: &str) -> Option<f64> {
        self.nodes.find(&format!("{owner}#branch")).map(|i| self.ctx.rhs_old[i])
    }

    /// Output labels of unknowns `1..=n`.
    pub fn labels(&self) -> Vec<String> {
        (1..self.nodes.len()).map(|i| self.nodes.label(i)).collect()
    }
}
