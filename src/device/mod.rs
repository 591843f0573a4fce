//! Device models and the contract they implement.
//!
//! A device object is one model card together with every instance that
//! references it. The circuit holds device objects in registration order
//! and dispatches through the [`Device`] trait; [`DeviceKind`] tags the
//! concrete type for diagnostics and capability checks.

pub mod bsim3;
pub mod capacitor;
pub mod diode;
pub mod inductor;
pub mod isource;
pub mod limit;
pub mod resistor;
pub mod vsource;
pub mod waveform;

use crate::circuit::NodeTable;
use crate::context::SimContext;
use crate::error::{NodalError, Result};
use crate::matrix::{MatrixHandle, SparseMatrix};
use crate::options::SimOptions;
use crate::report::Reporter;
use num_complex::Complex64;
use std::fmt::Debug;

/// Reference temperature (K).
pub const REFTEMP: f64 = 300.15;
/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380_622_6e-23;
/// Elementary charge (C).
pub const CHARGE: f64 = 1.602_191_8e-19;
pub const KOVERQ: f64 = BOLTZMANN / CHARGE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    Resistor,
    Capacitor,
    Inductor,
    VoltageSource,
    CurrentSource,
    Diode,
    Bsim3,
}

impl DeviceKind {
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Resistor => "resistor",
            DeviceKind::Capacitor => "capacitor",
            DeviceKind::Inductor => "inductor",
            DeviceKind::VoltageSource => "vsource",
            DeviceKind::CurrentSource => "isource",
            DeviceKind::Diode => "diode",
            DeviceKind::Bsim3 => "bsim3",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "r" | "resistor" => DeviceKind::Resistor,
            "c" | "capacitor" => DeviceKind::Capacitor,
            "l" | "inductor" => DeviceKind::Inductor,
            "v" | "vsource" => DeviceKind::VoltageSource,
            "i" | "isource" => DeviceKind::CurrentSource,
            "d" | "diode" => DeviceKind::Diode,
            "m" | "bsim3" | "nmos" | "pmos" => DeviceKind::Bsim3,
            _ => return None,
        };
        Some(kind)
    }
}

/// Analyses a device type can take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub ac: bool,
    pub pz: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { ac: true, pz: true }
    }
}

/// Resources handed to a device while the circuit is elaborated.
pub struct Setup<'a> {
    pub(crate) nodes: &'a mut NodeTable,
    pub(crate) matrix: &'a mut SparseMatrix,
    pub(crate) num_states: &'a mut usize,
}

impl Setup<'_> {
    /// Index of the named external node, created on first use.
    pub fn node(&mut self, name: &str) -> usize {
        self.nodes.node(name)
    }

    /// A fresh internal node owned by `owner`.
    pub fn internal_node(&mut self, owner: &str, suffix: &str) -> usize {
        self.nodes.internal(&format!("{owner}#{suffix}"))
    }

    /// A branch-current unknown owned by `owner`.
    pub fn branch(&mut self, owner: &str) -> usize {
        self.nodes.branch(owner)
    }

    /// Reserve `count` consecutive state slots; returns the first.
    pub fn states(&mut self, count: usize) -> usize {
        let base = *self.num_states;
        *self.num_states += count;
        base
    }

    pub fn allocate(&mut self, row: usize, col: usize) -> MatrixHandle {
        self.matrix.allocate(row, col)
    }
}

/// The four handles of a two-terminal conductance between `p` and `n`.
#[derive(Debug, Clone, Copy)]
pub struct PairStamp {
    pp: MatrixHandle,
    pn: MatrixHandle,
    np: MatrixHandle,
    nn: MatrixHandle,
}

impl PairStamp {
    pub fn new(setup: &mut Setup<'_>, p: usize, n: usize) -> Self {
        Self {
            pp: setup.allocate(p, p),
            pn: setup.allocate(p, n),
            np: setup.allocate(n, p),
            nn: setup.allocate(n, n),
        }
    }

    pub fn add(&self, matrix: &mut SparseMatrix, g: f64) {
        matrix.add(self.pp, g);
        matrix.add(self.nn, g);
        matrix.add(self.pn, -g);
        matrix.add(self.np, -g);
    }

    pub fn add_complex(&self, matrix: &mut SparseMatrix, y: Complex64) {
        matrix.add_complex(self.pp, y);
        matrix.add_complex(self.nn, y);
        matrix.add_complex(self.pn, -y);
        matrix.add_complex(self.np, -y);
    }
}

/// The contract between a device type and the simulator.
///
/// Calls arrive in this order: `setup`, `temperature`, `check_model`,
/// then per analysis any number of `load`, `conv_test`, `ac_load`,
/// `pz_load`, `get_ic` and `trunc`.
pub trait Device: Debug {
    fn kind(&self) -> DeviceKind;

    /// Model name.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn instance_names(&self) -> Vec<&str>;

    fn set_model_param(&mut self, param: &str, _value: f64) -> Result<()> {
        Err(NodalError::BadParam {
            device: self.name().to_string(),
            param: param.to_string(),
        })
    }

    fn set_instance_param(&mut self, instance: &str, param: &str, value: f64) -> Result<()>;

    /// Read back an instance parameter, where the device supports it.
    fn ask(&self, _instance: &str, _param: &str) -> Option<f64> {
        None
    }

    /// Allocate internal nodes, branch unknowns, state slots and handles.
    fn setup(&mut self, setup: &mut Setup<'_>) -> Result<()>;

    /// Temperature and geometry preprocessing.
    fn temperature(&mut self, _options: &SimOptions) -> Result<()> {
        Ok(())
    }

    /// Validate parameters, clamping recoverable ones.
    fn check_model(&mut self, _reporter: &mut dyn Reporter) -> Result<()> {
        Ok(())
    }

    /// Stamp the linearized companion model at the current iterate.
    fn load(&mut self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()>;

    /// Stamp `G + jωC` and any AC excitation.
    fn ac_load(&self, ctx: &mut SimContext, matrix: &mut SparseMatrix) -> Result<()>;

    /// Stamp `G + sC`.
    fn pz_load(&self, s: Complex64, matrix: &mut SparseMatrix) -> Result<()>;

    /// Check every instance; on the first failure bump `ctx.noncon` and
    /// return `false`.
    fn conv_test(&self, _ctx: &mut SimContext) -> bool {
        true
    }

    /// Take unset initial conditions from the current solution.
    fn get_ic(&mut self, _ctx: &SimContext) {}

    /// Lower `step` to the largest step every charge state allows.
    fn trunc(&self, _ctx: &SimContext, _step: &mut f64) {}
}

/// Thermal voltage at `temp` kelvin.
pub fn thermal_voltage(temp: f64) -> f64 {
    KOVERQ * temp
}

pub(crate) fn bad_param(device: &str, param: &str) -> NodalError {
    NodalError::BadParam {
        device: device.to_string(),
        param: param.to_string(),
    }
}

pub(crate) fn no_instance(device: &str, instance: &str) -> NodalError {
    NodalError::Setup(format!("{device}: no instance named '{instance}'"))
}
