//! TOML circuit decks.
//!
//! A deck lists simulator options, model cards, elements and analyses:
//!
//! ```toml
//! title = "diode clamp"
//!
//! [options]
//! reltol = 1e-4
//!
//! [[model]]
//! name = "dmod"
//! kind = "diode"
//! params = { is = 1e-14, n = 1.05 }
//!
//! [[element]]
//! name = "v1"
//! kind = "vsource"
//! nodes = ["in", "0"]
//! params = { dc = 5.0, acmag = 1.0 }
//!
//! [[element]]
//! name = "d1"
//! model = "dmod"
//! nodes = ["in", "0"]
//!
//! [[analysis]]
//! type = "op"
//! ```
//!
//! Elements without a `model` share one implicit model per kind. Every
//! parameter goes through the keyed parameter API of its device.

use crate::analysis::ac::{AcAnalysis, AcSweepType};
use crate::analysis::dc::DcSweep;
use crate::analysis::op::OpAnalysis;
use crate::analysis::pz::PoleZeroProbe;
use crate::analysis::transient::Transient;
use crate::analysis::Analysis;
use crate::circuit::Circuit;
use crate::device::bsim3::Bsim3;
use crate::device::capacitor::Capacitor;
use crate::device::diode::Diode;
use crate::device::inductor::Inductor;
use crate::device::isource::CurrentSource;
use crate::device::resistor::Resistor;
use crate::device::vsource::VoltageSource;
use crate::device::waveform::Waveform;
use crate::device::{Device, DeviceKind};
use crate::error::{NodalError, Result};
use crate::options::SimOptions;
use crate::report::{Reporter, TracingReporter};
use num_complex::Complex64;
use serde_derive::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deck {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub options: SimOptions,
    #[serde(default, rename = "model")]
    pub models: Vec<ModelCard>,
    #[serde(default, rename = "element")]
    pub elements: Vec<ElementCard>,
    #[serde(default, rename = "analysis")]
    pub analyses: Vec<AnalysisCard>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelCard {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElementCard {
    pub name: String,
    pub kind: Option<String>,
    pub model: Option<String>,
    pub nodes: Vec<String>,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    pub waveform: Option<Waveform>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum AnalysisCard {
    Op,
    Dc {
        source: String,
        start: f64,
        stop: f64,
        step: f64,
    },
    Ac {
        sweep: AcSweepType,
        points: usize,
        fstart: f64,
        fstop: f64,
    },
    Tran {
        tstep: f64,
        tstop: f64,
        #[serde(default)]
        tstart: f64,
        tmax: Option<f64>,
        #[serde(default)]
        uic: bool,
    },
    Pz {
        input: (String, String),
        output: (String, String),
        /// Complex frequencies as `[re, im]` pairs.
        points: Vec<(f64, f64)>,
    },
}

impl AnalysisCard {
    pub fn build(&self) -> Box<dyn Analysis> {
        match self {
            AnalysisCard::Op => Box::new(OpAnalysis::new()),
            AnalysisCard::Dc { source, start, stop, step } => Box::new(DcSweep::new(source, *start, *stop, *step)),
            AnalysisCard::Ac { sweep, points, fstart, fstop } => {
                Box::new(AcAnalysis::new(*sweep, *points, *fstart, *fstop))
            }
            AnalysisCard::Tran { tstep, tstop, tstart, tmax, uic } => {
                let mut tran = Transient::new(*tstep, *tstop).with_start(*tstart).with_uic(*uic);
                if let Some(tmax) = tmax {
                    tran = tran.with_max_step(*tmax);
                }
                Box::new(tran)
            }
            AnalysisCard::Pz { input, output, points } => Box::new(PoleZeroProbe::new(
                (&input.0, &input.1),
                (&output.0, &output.1),
                points.iter().map(|&(re, im)| Complex64::new(re, im)).collect(),
            )),
        }
    }
}

/// A model object under construction, before it is boxed as a device.
#[derive(Debug)]
enum ModelBuilder {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Diode(Diode),
    Bsim3(Bsim3),
}

impl ModelBuilder {
    fn new(kind: DeviceKind, name: &str) -> Self {
        match kind {
            DeviceKind::Resistor => ModelBuilder::Resistor(Resistor::new(name)),
            DeviceKind::Capacitor => ModelBuilder::Capacitor(Capacitor::new(name)),
            DeviceKind::Inductor => ModelBuilder::Inductor(Inductor::new(name)),
            DeviceKind::VoltageSource => ModelBuilder::VoltageSource(VoltageSource::new(name)),
            DeviceKind::CurrentSource => ModelBuilder::CurrentSource(CurrentSource::new(name)),
            DeviceKind::Diode => ModelBuilder::Diode(Diode::new(name)),
            DeviceKind::Bsim3 => ModelBuilder::Bsim3(Bsim3::new(name)),
        }
    }

    fn device_mut(&mut self) -> &mut dyn Device {
        match self {
            ModelBuilder::Resistor(d) => d,
            ModelBuilder::Capacitor(d) => d,
            ModelBuilder::Inductor(d) => d,
            ModelBuilder::VoltageSource(d) => d,
            ModelBuilder::CurrentSource(d) => d,
            ModelBuilder::Diode(d) => d,
            ModelBuilder::Bsim3(d) => d,
        }
    }

    fn into_device(self) -> Box<dyn Device> {
        match self {
            ModelBuilder::Resistor(d) => Box::new(d),
            ModelBuilder::Capacitor(d) => Box::new(d),
            ModelBuilder::Inductor(d) => Box::new(d),
            ModelBuilder::VoltageSource(d) => Box::new(d),
            ModelBuilder::CurrentSource(d) => Box::new(d),
            ModelBuilder::Diode(d) => Box::new(d),
            ModelBuilder::Bsim3(d) => Box::new(d),
        }
    }

    fn add_instance(&mut self, card: &ElementCard) -> Result<()> {
        let terminals = match self {
            ModelBuilder::Bsim3(_) => 4,
            _ => 2,
        };
        if card.nodes.len() != terminals {
            return Err(NodalError::Deck(format!(
                "element '{}' needs {terminals} nodes, got {}",
                card.name,
                card.nodes.len()
            )));
        }
        let n = &card.nodes;
        let value = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| card.params.get(*k).copied())
                .ok_or_else(|| NodalError::Deck(format!("element '{}' needs parameter '{}'", card.name, keys[0])))
        };
        match self {
            ModelBuilder::Resistor(d) => {
                d.add(&card.name, &n[0], &n[1], value(&["r", "resistance"])?);
            }
            ModelBuilder::Capacitor(d) => {
                d.add(&card.name, &n[0], &n[1], value(&["c", "capacitance"])?);
            }
            ModelBuilder::Inductor(d) => {
                d.add(&card.name, &n[0], &n[1], value(&["l", "inductance"])?);
            }
            ModelBuilder::VoltageSource(d) => {
                d.add(&card.name, &n[0], &n[1], 0.0);
                if let Some(w) = &card.waveform {
                    d.with_waveform(w.clone());
                }
            }
            ModelBuilder::CurrentSource(d) => {
                d.add(&card.name, &n[0], &n[1], 0.0);
                if let Some(w) = &card.waveform {
                    d.with_waveform(w.clone());
                }
            }
            ModelBuilder::Diode(d) => {
                d.add(&card.name, &n[0], &n[1]);
            }
            ModelBuilder::Bsim3(d) => {
                d.add(&card.name, &n[0], &n[1], &n[2], &n[3]);
            }
        }
        if card.waveform.is_some()
            && !matches!(self, ModelBuilder::VoltageSource(_) | ModelBuilder::CurrentSource(_))
        {
            return Err(NodalError::Deck(format!("element '{}' cannot take a waveform", card.name)));
        }
        let device = self.device_mut();
        for (param, &v) in &card.params {
            device.set_instance_param(&card.name, param, v)?;
        }
        Ok(())
    }
}

fn parse_kind(kind: &str) -> Result<DeviceKind> {
    DeviceKind::from_name(kind).ok_or_else(|| NodalError::Deck(format!("unknown device kind '{kind}'")))
}

impl Deck {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn build_circuit(&self) -> Result<Circuit> {
        self.build_circuit_with(Box::new(TracingReporter))
    }

    /// Elaborate the deck into a circuit with the given diagnostics sink.
    pub fn build_circuit_with(&self, reporter: Box<dyn Reporter>) -> Result<Circuit> {
        let mut builders: Vec<(String, ModelBuilder)> = Vec::new();
        for card in &self.models {
            if builders.iter().any(|(name, _)| name == &card.name) {
                return Err(NodalError::Deck(format!("model '{}' defined twice", card.name)));
            }
            let mut builder = ModelBuilder::new(parse_kind(&card.kind)?, &card.name);
            let device = builder.device_mut();
            if card.kind.eq_ignore_ascii_case("pmos") {
                device.set_model_param("pmos", 1.0)?;
            }
            for (param, &v) in &card.params {
                device.set_model_param(param, v)?;
            }
            builders.push((card.name.clone(), builder));
        }

        for card in &self.elements {
            let model = match (&card.model, &card.kind) {
                (Some(model), _) => model.clone(),
                (None, Some(kind)) => {
                    let kind = parse_kind(kind)?;
                    let name = kind.name().to_string();
                    if !builders.iter().any(|(n, _)| n == &name) {
                        builders.push((name.clone(), ModelBuilder::new(kind, &name)));
                    }
                    name
                }
                (None, None) => {
                    return Err(NodalError::Deck(format!("element '{}' names neither kind nor model", card.name)));
                }
            };
            let (_, builder) = builders
                .iter_mut()
                .find(|(n, _)| n == &model)
                .ok_or_else(|| NodalError::Deck(format!("element '{}' references unknown model '{model}'", card.name)))?;
            if let Some(kind) = &card.kind {
                let expected = parse_kind(kind)?;
                if builder.device_mut().kind() != expected {
                    return Err(NodalError::Deck(format!(
                        "element '{}' is a {} but model '{model}' is not",
                        card.name,
                        expected.name()
                    )));
                }
            }
            builder.add_instance(card)?;
        }

        let mut circuit = Circuit::with_reporter(self.options.clone(), reporter);
        for (_, builder) in builders {
            circuit.add_device(builder.into_device())?;
        }
        Ok(circuit)
    }

    pub fn build_analyses(&self) -> Vec<Box<dyn Analysis>> {
        self.analyses.iter().map(AnalysisCard::build).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIVIDER: &str = r#"
title = "divider"

[options]
reltol = 1e-4

[[element]]
name = "v1"
kind = "vsource"
nodes = ["in", "0"]
params = { dc = 10.0 }

[[element]]
name = "r1"
kind = "resistor"
nodes = ["in", "out"]
params = { r = 1e3 }

[[element]]
name = "r2"
kind = "r"
nodes = ["out", "0"]
params = { r = 1e3 }

[[analysis]]
type = "op"

[[analysis]]
type = "ac"
sweep = "dec"
points = 5
fstart = 1.0
fstop = 1e3
"#;

    #[test]
    fn divider_deck_elaborates() {
        let deck = Deck::from_toml(DIVIDER).unwrap();
        assert_eq!(deck.title, "divider");
        assert_eq!(deck.options.reltol, 1e-4);
        let ckt = deck.build_circuit().unwrap();
        assert_eq!(ckt.devices().count(), 2);
        assert_eq!(ckt.instance_param("v1", "dc"), Some(10.0));
        let names: Vec<&str> = deck.build_analyses().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["op", "ac"]);
    }

    #[test]
    fn missing_primary_value_rejected() {
        let text = r#"
[[element]]
name = "r1"
kind = "resistor"
nodes = ["a", "0"]
"#;
        let err = Deck::from_toml(text).unwrap().build_circuit().unwrap_err();
        assert!(matches!(err, NodalError::Deck(_)));
    }

    #[test]
    fn unknown_model_param_rejected() {
        let text = r#"
[[model]]
name = "dmod"
kind = "diode"
params = { bogus = 1.0 }
"#;
        let err = Deck::from_toml(text).unwrap().build_circuit().unwrap_err();
        assert!(matches!(err, NodalError::BadParam { .. }));
    }

    #[test]
    fn pmos_model_and_waveform() {
        let text = r#"
[[model]]
name = "pch"
kind = "pmos"
params = { tox = 1e-8 }

[[element]]
name = "m1"
model = "pch"
nodes = ["d", "g", "s", "s"]
params = { w = 10e-6, l = 1e-6 }

[[element]]
name = "vin"
kind = "v"
nodes = ["g", "0"]
waveform = { pulse = { v1 = 0.0, v2 = 1.0, tr = 1e-9, pw = 5e-9 } }

[[analysis]]
type = "tran"
tstep = 1e-10
tstop = 1e-8
"#;
        let deck = Deck::from_toml(text).unwrap();
        let ckt = deck.build_circuit().unwrap();
        assert_eq!(ckt.device("pch").unwrap().kind(), DeviceKind::Bsim3);
        assert_eq!(ckt.device("vsource").unwrap().instance_names(), vec!["vin"]);
    }

    #[test]
    fn wrong_terminal_count_rejected() {
        let text = r#"
[[element]]
name = "d1"
kind = "diode"
nodes = ["a", "b", "c"]
"#;
        assert!(Deck::from_toml(text).unwrap().build_circuit().is_err());
    }
}
