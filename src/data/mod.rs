// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// Everything from .npy files on disk to tensor batches:
//
//   .npy maps + params.txt
//       │
//       ▼
//   NpyMapLoader      → reads stacks, checks map/simulation counts
//       │
//       ▼
//   FieldStats        → log10 + standardisation per channel
//       │
//       ▼
//   SimulationSplit   → seeded 90/5/5 split over simulations
//       │
//       ▼
//   MapDataset        → Burn Dataset, dihedral augmentation for train
//       │
//       ▼
//   MapBatcher        → [N, C, H, W] maps + [N, 6] labels
//       │
//       ▼
//   DataLoader        → feeds the trainer and evaluator

/// Reads .npy field maps and the parameter table
pub mod loader;

/// Per-channel log10 + standardisation
pub mod normalization;

/// Rotations and flips of square maps
pub mod augment;

/// Seeded simulation-level train/valid/test split
pub mod splitter;

/// Burn Dataset over normalised maps
pub mod dataset;

/// Burn Batcher producing map and label tensors
pub mod batcher;
