// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types describing the experiment: the labelled
// parameters and their prior bounds, how the network output
// splits into means and uncertainties, which architecture to
// build, and the traits other layers implement.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only structs, enums and traits

/// Labelled parameters, prior bounds, (de)normalisation
pub mod parameters;

/// Feature-count modes and the mean/uncertainty split
pub mod target_schema;

/// Architecture, head and accelerator choices
pub mod architecture;

/// Stacked maps and labels of a simulation suite
pub mod simulation;

/// Abstractions implemented by the data and ml layers
pub mod traits;
