//! Circuit-simulation core: nonlinear device models coupled to a sparse
//! modified-nodal-analysis system and solved by Newton-Raphson per
//! operating point, time point and sweep point.

pub mod analysis;
pub mod circuit;
pub mod context;
pub mod deck;
pub mod device;
pub mod error;
pub mod history;
pub mod matrix;
pub mod newton;
pub mod options;
pub mod output;
pub mod report;
pub mod solver;
pub mod sparse;
pub mod stats;

pub use circuit::Circuit;
pub use error::{NodalError, Result};
