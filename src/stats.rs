//! Performance statistics collection for `--stats` output.

use std::time::{Duration, Instant};

/// Counters and phase timings accumulated over a run.
#[derive(Debug, Clone)]
pub struct Stats {
    total_start: Instant,
    phases: Vec<(&'static str, Duration)>,
    pub newton_iterations: u32,
    pub newton_failures: u32,
    pub device_load: Duration,
    pub linear_solve: Duration,
    pub linear_solves: u32,
    pub factorizations: u32,
    pub reorders: u32,
    pub timesteps_accepted: u32,
    pub timesteps_rejected: u32,
    pub sweep_points_failed: u32,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total_start: Instant::now(),
            phases: Vec::new(),
            newton_iterations: 0,
            newton_failures: 0,
            device_load: Duration::ZERO,
            linear_solve: Duration::ZERO,
            linear_solves: 0,
            factorizations: 0,
            reorders: 0,
            timesteps_accepted: 0,
            timesteps_rejected: 0,
            sweep_points_failed: 0,
        }
    }

    /// Record a completed phase with its duration.
    pub fn add_phase(&mut self, name: &'static str, duration: Duration) {
        self.phases.push((name, duration));
    }

    pub fn phases(&self) -> &[(&'static str, Duration)] {
        &self.phases
    }

    /// Print the stats table to stderr.
    pub fn display(&self) {
        let total = self.total_start.elapsed();
        eprintln!();
        eprintln!("=== nodal statistics ===");

        for (name, dur) in &self.phases {
            eprintln!("  {:<24} {:>8.3}s", name, dur.as_secs_f64());
        }

        if self.newton_iterations > 0 {
            eprintln!("  Newton iterations:      {}", self.newton_iterations);
            eprintln!("    Failed solves:        {}", self.newton_failures);
            eprintln!("    Device load:          {:>8.3}s", self.device_load.as_secs_f64());
            eprintln!("    Linear solve:         {:>8.3}s", self.linear_solve.as_secs_f64());
        }

        if self.linear_solves > 0 {
            eprintln!(
                "  Linear solves:          {}  (factorizations={} reorders={})",
                self.linear_solves, self.factorizations, self.reorders
            );
        }

        if self.timesteps_accepted > 0 || self.timesteps_rejected > 0 {
            eprintln!(
                "  Timesteps:              accepted={}  rejected={}",
                self.timesteps_accepted, self.timesteps_rejected
            );
        }

        if self.sweep_points_failed > 0 {
            eprintln!("  Failed sweep points:    {}", self.sweep_points_failed);
        }

        eprintln!("  ─────────────────────────────────");
        eprintln!("  Total:                  {:>8.3}s", total.as_secs_f64());
    }
}
