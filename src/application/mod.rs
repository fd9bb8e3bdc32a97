// ============================================================
// Layer 2 - Application / Use Cases
// ============================================================
// Orchestrates the other layers for one command each. No model
// math and no printing here: the CLI prints the returned report.

/// Load, train, test, plot
pub mod train_use_case;

/// Reload a finished run and re-test it
pub mod evaluate_use_case;
