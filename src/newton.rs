//! Newton-Raphson iteration at one operating, time or sweep point.
//!
//! Each iteration loads every device at the previous iterate, solves the
//! linearized system and tests convergence. The initialization phase in
//! [`SimContext::phase`](crate::context::SimContext) advances along
//! `Junction -> Fix -> Float`; convergence is only accepted in `Float`.

use crate::circuit::Circuit;
use crate::context::{InitPhase, SimContext, UnknownKind};
use crate::error::{NodalError, Result};
use std::time::Instant;

/// Iterate until converged or `max_iterations` is exceeded.
///
/// Returns the number of iterations taken. On success `ctx.rhs_old`
/// holds the converged solution. A singular matrix aborts at once.
pub fn solve(circuit: &mut Circuit, max_iterations: usize) -> Result<usize> {
    let mut iterations = 0;
    loop {
        if iterations >= max_iterations {
            circuit.ctx.stats.newton_failures += 1;
            tracing::debug!(iterations, "Newton iteration limit reached");
            return Err(NodalError::NonConvergence { iterations });
        }
        iterations += 1;
        let _span = tracing::debug_span!("newton", iteration = iterations).entered();

        let start = Instant::now();
        circuit.load()?;
        circuit.ctx.stats.device_load += start.elapsed();

        let start = Instant::now();
        let solved = circuit.matrix.factor_and_solve(&mut circuit.ctx.rhs);
        let (factorizations, reorders) = circuit.matrix.solver_counters();
        let stats = &mut circuit.ctx.stats;
        stats.newton_iterations += 1;
        stats.linear_solve += start.elapsed();
        stats.linear_solves += 1;
        stats.factorizations = factorizations;
        stats.reorders = reorders;
        if let Err(e) = solved {
            stats.newton_failures += 1;
            return Err(e);
        }

        let ctx = &mut circuit.ctx;
        std::mem::swap(&mut ctx.rhs, &mut ctx.rhs_old);
        if ctx.rhs_old.iter().any(|v| !v.is_finite()) {
            ctx.stats.newton_failures += 1;
            tracing::debug!("non-finite solution entry");
            return Err(NodalError::NonConvergence { iterations });
        }

        // The first iterate of a point has nothing to compare against.
        let tested = ctx.noncon == 0 && iterations > 1 && node_test(ctx) && circuit.conv_test();
        let ctx = &mut circuit.ctx;
        if !tested {
            ctx.noncon = ctx.noncon.max(1);
        }
        let converged = ctx.noncon == 0;

        tracing::debug!(noncon = ctx.noncon, phase = ?ctx.phase, "iterate");
        match ctx.phase {
            InitPhase::Float => {
                if converged {
                    tracing::debug!(iterations, "Newton converged");
                    return Ok(iterations);
                }
            }
            InitPhase::Junction => ctx.phase = InitPhase::Fix,
            InitPhase::Fix => {
                if ctx.noncon == 0 {
                    ctx.phase = InitPhase::Float;
                }
            }
            InitPhase::Transient | InitPhase::Predict | InitPhase::SmallSignal => {
                ctx.phase = InitPhase::Float;
            }
        }
    }
}

/// Compare the new iterate in `rhs_old` against the previous one in `rhs`.
fn node_test(ctx: &SimContext) -> bool {
    let opts = &ctx.options;
    (1..ctx.rhs.len()).all(|i| {
        let new = ctx.rhs_old[i];
        let old = ctx.rhs[i];
        let floor = match ctx.unknown_kind(i) {
            UnknownKind::Voltage => opts.vntol,
            UnknownKind::Current => opts.abstol,
        };
        let tol = opts.reltol * new.abs().max(old.abs()) + floor;
        let ok = (new - old).abs() <= tol;
        if !ok {
            tracing::trace!(unknown = i, new, old, "node not converged");
        }
        ok
    })
}
