//! BSIM3 model and instance parameters.

/// Declares the plain numeric model parameters with their defaults and the
/// keyed setter the netlist layer uses.
macro_rules! model_params {
    ($( $(#[$doc:meta])* $field:ident = $default:expr ),* $(,)?) => {
        #[derive(Debug, Clone)]
        pub struct ModelParams {
            /// `1` for NMOS, `-1` for PMOS.
            pub typ: f64,
            /// Long-channel zero-bias threshold; polarity-signed.
            pub vth0: Option<f64>,
            pub k1: Option<f64>,
            pub k2: Option<f64>,
            pub gamma1: Option<f64>,
            pub gamma2: Option<f64>,
            pub tnom: Option<f64>,
            pub dlc: Option<f64>,
            pub dwc: Option<f64>,
            $( $(#[$doc])* pub $field: f64, )*
        }

        impl Default for ModelParams {
            fn default() -> Self {
                Self {
                    typ: 1.0,
                    vth0: None,
                    k1: None,
                    k2: None,
                    gamma1: None,
                    gamma2: None,
                    tnom: None,
                    dlc: None,
                    dwc: None,
                    $( $field: $default, )*
                }
            }
        }

        impl ModelParams {
            /// Set a parameter by name. Returns `false` for unknown names.
            pub fn set(&mut self, name: &str, value: f64) -> bool {
                match name {
                    "type" => self.typ = if value < 0.0 { -1.0 } else { 1.0 },
                    "nmos" => self.typ = 1.0,
                    "pmos" => self.typ = -1.0,
                    "vth0" | "vtho" => self.vth0 = Some(value),
                    "k1" => self.k1 = Some(value),
                    "k2" => self.k2 = Some(value),
                    "gamma1" => self.gamma1 = Some(value),
                    "gamma2" => self.gamma2 = Some(value),
                    "tnom" => self.tnom = Some(value),
                    "dlc" => self.dlc = Some(value),
                    "dwc" => self.dwc = Some(value),
                    $( stringify!($field) => self.$field = value, )*
                    _ => return false,
                }
                true
            }
        }
    };
}

model_params! {
    /// Gate oxide thickness (m).
    tox = 150e-10,
    /// Junction depth (m).
    xj = 1.5e-7,
    /// Channel doping (cm^-3).
    npeak = 1.7e17,
    /// Substrate doping (cm^-3).
    nsub = 6.0e16,
    /// Poly gate doping (cm^-3); zero disables the check.
    ngate = 0.0,
    vbm = -3.0,
    xt = 1.55e-7,
    k3 = 80.0,
    k3b = 0.0,
    w0 = 2.5e-6,
    /// Lateral non-uniform doping (m).
    nlx = 1.74e-7,
    dvt0 = 2.2,
    dvt1 = 0.53,
    dvt0w = 0.0,
    dvt1w = 5.3e6,
    eta0 = 0.08,
    etab = -0.07,
    dsub = 0.56,
    /// Low-field mobility; values above 1 are taken as cm^2/Vs.
    u0 = 670.0,
    ua = 2.25e-9,
    ub = 5.87e-19,
    uc = -4.65e-11,
    /// Saturation velocity (m/s).
    vsat = 8.0e4,
    a0 = 1.0,
    a1 = 0.0,
    a2 = 1.0,
    b0 = 0.0,
    b1 = 0.0,
    keta = -0.047,
    voff = -0.08,
    nfactor = 1.0,
    cdsc = 2.4e-4,
    cit = 0.0,
    pclm = 1.3,
    delta = 0.01,
    kt1 = -0.11,
    kt1l = 0.0,
    kt2 = 0.022,
    ute = -1.5,
    ua1 = 4.31e-9,
    ub1 = -7.61e-18,
    uc1 = -5.6e-11,
    at = 3.3e4,
    lint = 0.0,
    wint = 0.0,
    /// Drain/source diffusion sheet resistance (Ω/sq).
    rsh = 0.0,
    /// Junction saturation current density (A/m^2).
    js = 1.0e-4,
    jssw = 0.0,
    cj = 5.0e-4,
    mj = 0.5,
    pb = 1.0,
    cjsw = 5.0e-10,
    mjsw = 0.33,
    pbsw = 1.0,
    cgso = 0.0,
    cgdo = 0.0,
    cgbo = 0.0,
}

impl ModelParams {
    /// Zero-bias threshold in the device's own polarity.
    pub fn vth0(&self) -> f64 {
        self.vth0.unwrap_or(0.7 * self.typ)
    }

    pub fn u0_si(&self) -> f64 {
        if self.u0 > 1.0 {
            self.u0 * 1e-4
        } else {
            self.u0
        }
    }
}

/// Per-instance geometry, flags and initial conditions.
#[derive(Debug, Clone)]
pub struct InstanceParams {
    pub l: f64,
    pub w: f64,
    pub ad: f64,
    pub as_: f64,
    pub pd: f64,
    pub ps: f64,
    pub nrd: f64,
    pub nrs: f64,
    pub off: bool,
    pub icvds: Option<f64>,
    pub icvgs: Option<f64>,
    pub icvbs: Option<f64>,
}

impl Default for InstanceParams {
    fn default() -> Self {
        Self {
            l: 5e-6,
            w: 5e-6,
            ad: 0.0,
            as_: 0.0,
            pd: 0.0,
            ps: 0.0,
            nrd: 1.0,
            nrs: 1.0,
            off: false,
            icvds: None,
            icvgs: None,
            icvbs: None,
        }
    }
}

impl InstanceParams {
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match name {
            "l" => self.l = value,
            "w" => self.w = value,
            "ad" => self.ad = value,
            "as" => self.as_ = value,
            "pd" => self.pd = value,
            "ps" => self.ps = value,
            "nrd" => self.nrd = value,
            "nrs" => self.nrs = value,
            "off" => self.off = value != 0.0,
            "icvds" => self.icvds = Some(value),
            "icvgs" => self.icvgs = Some(value),
            "icvbs" => self.icvbs = Some(value),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_setter_covers_declared_fields() {
        let mut m = ModelParams::default();
        assert!(m.set("tox", 1e-8));
        assert!(m.set("pmos", 1.0));
        assert!(m.set("k1", 0.5));
        assert!(!m.set("no_such_param", 1.0));
        assert_eq!(m.tox, 1e-8);
        assert_eq!(m.typ, -1.0);
        assert_eq!(m.k1, Some(0.5));
        assert_eq!(m.vth0(), -0.7);
    }

    #[test]
    fn mobility_units_normalized() {
        let m = ModelParams::default();
        assert!((m.u0_si() - 0.067).abs() < 1e-12);
    }
}
