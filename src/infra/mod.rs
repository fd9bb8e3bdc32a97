// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// Side effects that several layers need but none owns:
//
//   checkpoint.rs  best model (full-precision MessagePack) + experiment config JSON
//   metrics.rs     per-epoch CSV and filter-parameter JSON lines
//   plots.rs       predicted-vs-true SVG scatter plots

/// Model checkpoint and config persistence
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// Scatter plots of test predictions
pub mod plots;
