//! Time-dependent values of independent sources.

use serde_derive::Deserialize;
use std::f64::consts::PI;

/// Transient stimulus of an independent source.
///
/// Zero rise/fall times and a zero period take SPICE's defaults from the
/// analysis step when the source is attached to a transient run; here a
/// zero edge is an ideal step and a zero period means a single pulse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase", deny_unknown_fields)]
pub enum Waveform {
    Pulse {
        v1: f64,
        v2: f64,
        #[serde(default)]
        td: f64,
        #[serde(default)]
        tr: f64,
        #[serde(default)]
        tf: f64,
        #[serde(default = "infinite")]
        pw: f64,
        #[serde(default)]
        per: f64,
    },
    Sin {
        vo: f64,
        va: f64,
        freq: f64,
        #[serde(default)]
        td: f64,
        #[serde(default)]
        theta: f64,
    },
    Exp {
        v1: f64,
        v2: f64,
        #[serde(default)]
        td1: f64,
        tau1: f64,
        td2: f64,
        tau2: f64,
    },
    Pwl {
        points: Vec<(f64, f64)>,
    },
}

fn infinite() -> f64 {
    f64::INFINITY
}

impl Waveform {
    /// Value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        match *self {
            Waveform::Pulse { v1, v2, td, tr, tf, pw, per } => {
                if t < td {
                    return v1;
                }
                let local = if per > 0.0 && per.is_finite() { (t - td) % per } else { t - td };
                if local < tr {
                    v1 + (v2 - v1) * local / tr
                } else if local < tr + pw {
                    v2
                } else if local < tr + pw + tf {
                    v2 + (v1 - v2) * (local - tr - pw) / tf
                } else {
                    v1
                }
            }
            Waveform::Sin { vo, va, freq, td, theta } => {
                if t < td {
                    return vo;
                }
                let dt = t - td;
                vo + va * (2.0 * PI * freq * dt).sin() * (-dt * theta).exp()
            }
            Waveform::Exp { v1, v2, td1, tau1, td2, tau2 } => {
                if t < td1 {
                    return v1;
                }
                let rise = (v2 - v1) * (1.0 - (-(t - td1) / tau1).exp());
                if t < td2 {
                    v1 + rise
                } else {
                    v1 + rise + (v1 - v2) * (1.0 - (-(t - td2) / tau2).exp())
                }
            }
            Waveform::Pwl { ref points } => pwl(points, t),
        }
    }
}

fn pwl(points: &[(f64, f64)], t: f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if t <= first.0 {
        return first.1;
    }
    if t >= last.0 {
        return last.1;
    }
    points
        .windows(2)
        .find(|w| t <= w[1].0)
        .map(|w| {
            let ((t0, v0), (t1, v1)) = (w[0], w[1]);
            v0 + (v1 - v0) * (t - t0) / (t1 - t0)
        })
        .unwrap_or(last.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pulse() -> Waveform {
        Waveform::Pulse { v1: 0.0, v2: 5.0, td: 1.0, tr: 0.1, tf: 0.1, pw: 1.0, per: 3.0 }
    }

    #[test]
    fn pulse_edges_and_plateau() {
        let f = pulse();
        assert_abs_diff_eq!(f.value(0.5), 0.0);
        assert_abs_diff_eq!(f.value(1.05), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(f.value(1.5), 5.0);
        assert_abs_diff_eq!(f.value(2.15), 2.5, epsilon = 1e-9);
        assert_abs_diff_eq!(f.value(2.5), 0.0);
    }

    #[test]
    fn pulse_repeats_with_period() {
        let f = pulse();
        assert_abs_diff_eq!(f.value(4.5), f.value(1.5), epsilon = 1e-12);
    }

    #[test]
    fn pulse_default_width_holds_high() {
        let f: Waveform = toml::from_str::<std::collections::HashMap<String, Waveform>>(
            "w = { pulse = { v1 = 0.0, v2 = 1.0, tr = 1e-9 } }",
        )
        .unwrap()
        .remove("w")
        .unwrap();
        assert_abs_diff_eq!(f.value(1.0), 1.0);
    }

    #[test]
    fn sin_quarter_period_and_damping() {
        let f = Waveform::Sin { vo: 1.0, va: 2.0, freq: 1.0, td: 0.0, theta: 0.0 };
        assert_abs_diff_eq!(f.value(0.25), 3.0, epsilon = 1e-12);
        let damped = Waveform::Sin { vo: 0.0, va: 1.0, freq: 1.0, td: 0.0, theta: 1.0 };
        assert_abs_diff_eq!(damped.value(0.25), (-0.25f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn exp_rise_then_fall() {
        let f = Waveform::Exp { v1: 0.0, v2: 1.0, td1: 0.0, tau1: 1.0, td2: 1.0, tau2: 1.0 };
        assert_abs_diff_eq!(f.value(1.0), 1.0 - (-1.0f64).exp(), epsilon = 1e-12);
        let expected = (1.0 - (-2.0f64).exp()) - (1.0 - (-1.0f64).exp());
        assert_abs_diff_eq!(f.value(2.0), expected, epsilon = 1e-12);
    }

    #[test]
    fn pwl_clamps_and_interpolates() {
        let f = Waveform::Pwl { points: vec![(0.0, 0.0), (1.0, 2.0), (2.0, 2.0)] };
        assert_abs_diff_eq!(f.value(-1.0), 0.0);
        assert_abs_diff_eq!(f.value(0.5), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(f.value(5.0), 2.0);
        assert_abs_diff_eq!(Waveform::Pwl { points: vec![] }.value(1.0), 0.0);
    }
}
