//! Results output formatting (CSV).

use crate::analysis::Plot;
use crate::error::Result;
use std::io::Write;

/// Write an operating point as CSV.
///
/// Format:
/// ```csv
/// Variable,Value
/// V(1),5.0
/// V(2),3.3
/// I(v1),0.001
/// ```
pub fn write_op_csv<W: Write>(plot: &Plot, writer: &mut W) -> Result<()> {
    writeln!(writer, "Variable,Value")?;
    let Some(row) = plot.real.last() else {
        return Ok(());
    };
    for (name, value) in plot.meta.vectors.iter().zip(row) {
        writeln!(writer, "{},{}", name, value)?;
    }
    Ok(())
}

/// Write a real-valued sweep (DC transfer or transient) as CSV.
///
/// Format:
/// ```csv
/// time,V(1),V(2)
/// 0.0,0.0,0.0
/// 1e-9,0.1,0.05
/// ```
pub fn write_real_csv<W: Write>(plot: &Plot, writer: &mut W) -> Result<()> {
    write!(writer, "{}", plot.meta.scale)?;
    for name in &plot.meta.vectors {
        write!(writer, ",{}", name)?;
    }
    writeln!(writer)?;
    for (scale, row) in plot.scale.iter().zip(&plot.real) {
        write!(writer, "{}", scale)?;
        for v in row {
            write!(writer, ",{}", v)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write a complex-valued plot as magnitude and phase columns.
///
/// Format:
/// ```csv
/// frequency,V(1)_mag,V(1)_phase_deg,V(2)_mag,V(2)_phase_deg,...
/// 1.0,1.0,0.0,0.707,-45.0
/// 10.0,0.995,-5.7,0.701,-50.7
/// ```
pub fn write_complex_csv<W: Write>(plot: &Plot, writer: &mut W) -> Result<()> {
    write!(writer, "{}", plot.meta.scale)?;
    for name in &plot.meta.vectors {
        write!(writer, ",{}_mag,{}_phase_deg", name, name)?;
    }
    writeln!(writer)?;
    for (scale, row) in plot.scale.iter().zip(&plot.complex) {
        write!(writer, "{}", scale)?;
        for v in row {
            write!(writer, ",{},{}", v.norm(), v.arg().to_degrees())?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write any recorded plot in the format that suits its analysis.
pub fn write_plot<W: Write>(plot: &Plot, writer: &mut W) -> Result<()> {
    match (plot.meta.analysis, plot.meta.complex) {
        ("op", _) => write_op_csv(plot, writer),
        (_, true) => write_complex_csv(plot, writer),
        (_, false) => write_real_csv(plot, writer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{OutputSink, PlotMeta, Recorder};
    use num_complex::Complex64;

    fn meta(analysis: &'static str, scale: &str, complex: bool) -> PlotMeta {
        PlotMeta {
            analysis,
            title: String::new(),
            scale: scale.into(),
            vectors: vec!["V(1)".into(), "I(v1)".into()],
            complex,
        }
    }

    #[test]
    fn op_csv() {
        let mut rec = Recorder::new();
        let id = rec.begin_plot(meta("op", "point", false));
        rec.dump_real(id, 0.0, &[5.0, -0.001]);
        let mut buf = Vec::new();
        write_plot(rec.plot(id).unwrap(), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Variable,Value\nV(1),5\nI(v1),-0.001\n");
    }

    #[test]
    fn transient_csv_has_scale_column() {
        let mut rec = Recorder::new();
        let id = rec.begin_plot(meta("tran", "time", false));
        rec.dump_real(id, 0.0, &[0.0, 0.0]);
        rec.dump_real(id, 1e-9, &[0.5, 1e-3]);
        let mut buf = Vec::new();
        write_plot(rec.plot(id).unwrap(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,V(1),I(v1)");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("0.000000001,0.5,"));
    }

    #[test]
    fn ac_csv_magnitude_and_phase() {
        let mut rec = Recorder::new();
        let id = rec.begin_plot(meta("ac", "frequency", true));
        rec.dump_complex(id, 10.0, &[Complex64::new(2.0, 0.0), Complex64::new(1.0, 0.0)]);
        let mut buf = Vec::new();
        write_plot(rec.plot(id).unwrap(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("frequency,V(1)_mag,V(1)_phase_deg,I(v1)_mag,I(v1)_phase_deg\n"));
        assert!(text.ends_with("\n10,2,0,1,0\n"));
    }
}
