//! Newton step limiting for junction and FET terminal voltages.
//!
//! Large Newton updates across an exponential junction overflow or
//! oscillate; these functions pull the proposed voltage back toward the
//! previous iterate. A limited iteration must not be declared converged.

/// Critical voltage of a junction with saturation current `is` and
/// thermal voltage `vt`: the point of maximum curvature of the diode law.
pub fn critical_voltage(vt: f64, is: f64) -> f64 {
    vt * (vt / (std::f64::consts::SQRT_2 * is)).ln()
}

/// Limit a pn-junction voltage step. Returns the limited voltage and
/// whether limiting took place.
pub fn pnjlim(vnew: f64, vold: f64, vt: f64, vcrit: f64) -> (f64, bool) {
    if vnew > vcrit && (vnew - vold).abs() > 2.0 * vt {
        let limited = if vold > 0.0 {
            let arg = 1.0 + (vnew - vold) / vt;
            if arg > 0.0 {
                vold + vt * arg.ln()
            } else {
                vcrit
            }
        } else {
            vt * (vnew / vt).ln()
        };
        (limited, true)
    } else {
        (vnew, false)
    }
}

/// Limit a gate-source step around the threshold voltage `vto`.
pub fn fetlim(vnew: f64, vold: f64, vto: f64) -> f64 {
    let vtsthi = (2.0 * (vold - vto)).abs() + 2.0;
    let vtstlo = (vold - vto).abs() + 1.0;
    let vtox = vto + 3.5;
    let delv = vnew - vold;

    if vold >= vto {
        if vold >= vtox {
            if delv <= 0.0 {
                // going off
                if vnew >= vtox {
                    if -delv > vtstlo {
                        return vold - vtstlo;
                    }
                    vnew
                } else {
                    vnew.max(vto + 2.0)
                }
            } else if delv >= vtsthi {
                vold + vtsthi
            } else {
                vnew
            }
        } else if delv <= 0.0 {
            vnew.max(vto - 0.5)
        } else {
            vnew.min(vto + 4.0)
        }
    } else if delv <= 0.0 {
        if -delv > vtsthi {
            vold - vtsthi
        } else {
            vnew
        }
    } else {
        let vtemp = vto + 0.5;
        if vnew <= vtemp {
            if delv > vtstlo {
                vold + vtstlo
            } else {
                vnew
            }
        } else {
            vtemp
        }
    }
}

/// Limit a drain-source step.
pub fn limvds(vnew: f64, vold: f64) -> f64 {
    if vold >= 3.5 {
        if vnew > vold {
            vnew.min(3.0 * vold + 2.0)
        } else if vnew < 3.5 {
            vnew.max(2.0)
        } else {
            vnew
        }
    } else if vnew > vold {
        vnew.min(4.0)
    } else {
        vnew.max(-0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VT: f64 = 0.025864;

    #[test]
    fn pnjlim_passes_small_steps() {
        let vcrit = critical_voltage(VT, 1e-14);
        assert_eq!(pnjlim(0.61, 0.60, VT, vcrit), (0.61, false));
        assert_eq!(pnjlim(0.3, 0.0, VT, vcrit), (0.3, false));
    }

    #[test]
    fn pnjlim_compresses_large_forward_steps() {
        let vcrit = critical_voltage(VT, 1e-14);
        let (v, limited) = pnjlim(5.0, 0.6, VT, vcrit);
        assert!(limited);
        assert!(v > 0.6 && v < 0.6 + 10.0 * VT, "v = {v}");
        let (v, limited) = pnjlim(5.0, -1.0, VT, vcrit);
        assert!(limited);
        assert!((v - VT * (5.0 / VT).ln()).abs() < 1e-12);
    }

    #[test]
    fn fetlim_bounds_turn_on() {
        // From deep off, a large positive step stops just above threshold.
        assert!((fetlim(10.0, 0.0, 0.7) - 1.2).abs() < 1e-12);
        // Within the middle region a step is capped at vto + 4.
        assert!((fetlim(10.0, 1.0, 0.7) - 4.7).abs() < 1e-12);
        // Small steps pass.
        assert_eq!(fetlim(1.1, 1.0, 0.7), 1.1);
    }

    #[test]
    fn limvds_caps_growth() {
        assert_eq!(limvds(10.0, 1.0), 4.0);
        assert_eq!(limvds(-3.0, 1.0), -0.5);
        assert_eq!(limvds(20.0, 4.0), 14.0);
        assert_eq!(limvds(1.0, 4.0), 2.0);
    }
}
