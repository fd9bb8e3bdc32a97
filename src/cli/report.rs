// ============================================================
// Layer 1 - Run Report
// ============================================================
// Formats the end-of-run block printed after `train` and
// `evaluate`:
//
//   Training time (h): 0.0123
//   Test loss = -1.234e+01
//   Error Omega_m = 3.456
//   ...
//   Bayesian error Omega_m = 4.567
//   ...
//   Plot: plots/Omega_m.svg

use std::fmt::Write;

use crate::application::train_use_case::RunReport;
use crate::infra::metrics::format_sci;

pub fn render(report: &RunReport) -> String {
    let mut out = String::new();

    if let Some(hours) = report.training_hours {
        let _ = writeln!(out, "Training time (h): {hours:.4}");
    }
    if let Some(epoch) = report.best_epoch {
        let _ = writeln!(out, "Best epoch: {epoch:03}");
    }
    let _ = writeln!(
        out,
        "Test loss = {} ({} {} test maps)",
        format_sci(report.test_loss), report.test_samples, report.architecture
    );

    for r in &report.summary.reports {
        let _ = writeln!(out, "Error {} = {:.3}", r.parameter, r.percent_error);
    }
    for r in &report.summary.reports {
        if let Some(b) = r.bayesian_error {
            let _ = writeln!(out, "Bayesian error {} = {:.3}", r.parameter, b);
        }
    }
    for p in &report.plots {
        let _ = writeln!(out, "Plot: {}", p.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{architecture::Architecture, parameters::CosmoParameter};
    use crate::ml::evaluator::{EvaluationSummary, ParameterReport};
    use std::path::PathBuf;

    #[test]
    fn test_block_lists_errors_in_label_order() {
        let report = RunReport {
            architecture:   Architecture::Scattering,
            training_hours: Some(0.5),
            best_epoch:     Some(7),
            test_loss:      -12.5,
            test_samples:   20,
            summary: EvaluationSummary {
                reports: vec![
                    ParameterReport { parameter: CosmoParameter::OmegaM, percent_error: 3.4567, bayesian_error: Some(4.0) },
                    ParameterReport { parameter: CosmoParameter::Sigma8, percent_error: 1.0, bayesian_error: Some(2.5) },
                ],
                points: Vec::new(),
            },
            plots: vec![PathBuf::from("plots/Omega_m.svg")],
        };

        let text = render(&report);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Training time (h): 0.5000");
        assert_eq!(lines[1], "Best epoch: 007");
        assert_eq!(lines[2], "Test loss = -1.250e+01 (20 sn test maps)");
        assert_eq!(lines[3], "Error Omega_m = 3.457");
        assert_eq!(lines[4], "Error sigma_8 = 1.000");
        assert_eq!(lines[5], "Bayesian error Omega_m = 4.000");
        assert_eq!(lines[6], "Bayesian error sigma_8 = 2.500");
        assert_eq!(lines[7], "Plot: plots/Omega_m.svg");
    }

    #[test]
    fn test_evaluation_only_block_has_no_timing() {
        let report = RunReport {
            architecture:   Architecture::Cnn,
            training_hours: None,
            best_epoch:     None,
            test_loss:      1.0,
            test_samples:   1,
            summary:        EvaluationSummary { reports: Vec::new(), points: Vec::new() },
            plots:          Vec::new(),
        };
        assert_eq!(render(&report), "Test loss = 1.000e+00 (1 cnn test maps)\n");
    }
}
