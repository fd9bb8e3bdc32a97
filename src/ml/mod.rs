// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All network code lives here. Other layers only see the
// MapRegressor trait, the trainer and the evaluator.
//
//   context.rs     backend + device chosen once per run
//   regressor.rs   MapRegressor / LearnableFilters traits
//   scattering.rs  learnable scattering front-end + heads
//   vit.rs         patch-based vision transformer
//   cnn.rs         strided CNN and the shared conv block
//   builder.rs     config + geometry → concrete network
//   loss.rs        heteroscedastic loss + epoch accumulator
//   scheduler.rs   reduce-on-plateau learning rate
//   trainer.rs     train / validation epoch loop
//   evaluator.rs   test-set predictions and error summary

/// Backend + device handed to builders and loops
pub mod context;

/// Traits every architecture implements
pub mod regressor;

/// Learnable Morlet scattering network and its heads
pub mod scattering;

/// Vision transformer regressor
pub mod vit;

/// Plain CNN regressor
pub mod cnn;

/// Architecture builders driven by the experiment config
pub mod builder;

/// Heteroscedastic regression loss
pub mod loss;

/// Plateau learning-rate scheduler
pub mod scheduler;

/// Training loop with validation and best-model checkpointing
pub mod trainer;

/// Test-set evaluation and de-normalisation
pub mod evaluator;
