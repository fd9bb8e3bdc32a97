// ============================================================
// Layer 5 - Model Builders
// ============================================================
// Turn an ExperimentConfig plus the data geometry (channels,
// square map side) into a concrete network:
//
//   scattering_base    learnable scattering front-end
//   scattering_hybrid  front-end + cnn / mlp / linear head
//   vit, cnn           plain architectures
//
// `check_geometry` rejects map sizes an architecture cannot
// consume before any weights are allocated.

use anyhow::{bail, Result};
use burn::prelude::*;

use crate::application::train_use_case::ExperimentConfig;
use crate::domain::architecture::Architecture;
use crate::ml::cnn::{CnnConfig, CnnRegressor};
use crate::ml::scattering::{attach_head, LearnableScattering, ScatteringConfig, ScatteringRegressor};
use crate::ml::vit::{VitConfig, VitRegressor};

/// Input geometry shared by every builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapGeometry {
    pub channels:   usize,
    pub image_size: usize,
}

pub fn scattering_config(cfg: &ExperimentConfig, geometry: MapGeometry) -> ScatteringConfig {
    ScatteringConfig::new(geometry.channels, geometry.image_size)
        .with_scales(cfg.scattering.scales)
        .with_orientations(cfg.scattering.orientations)
        .with_order(cfg.scattering.order)
}

pub fn check_geometry(cfg: &ExperimentConfig, geometry: MapGeometry) -> Result<()> {
    let size = geometry.image_size;
    if geometry.channels == 0 || size == 0 {
        bail!("empty maps: {} channels of side {}", geometry.channels, size);
    }

    match cfg.architecture {
        Architecture::Scattering => {
            let pool = 1usize << cfg.scattering.scales;
            if size % pool != 0 {
                bail!("map side {size} is not divisible by 2^J = {pool}");
            }
        }
        Architecture::Vit => {
            if size % cfg.vit.patch_size != 0 {
                bail!("map side {size} is not divisible by patch size {}", cfg.vit.patch_size);
            }
        }
        Architecture::Cnn => {}
    }
    Ok(())
}

pub fn scattering_base<B: Backend>(
    cfg:      &ExperimentConfig,
    geometry: MapGeometry,
    device:   &B::Device,
) -> LearnableScattering<B> {
    let frontend = scattering_config(cfg, geometry).init(device);
    tracing::info!(
        "Scattering front-end: J={} L={} order={} kernel={} learnable={}",
        frontend.scales, frontend.orientations, frontend.order, frontend.kernel_size,
        cfg.scattering.learnable
    );
    frontend
}

pub fn scattering_hybrid<B: Backend>(
    cfg:      &ExperimentConfig,
    geometry: MapGeometry,
    device:   &B::Device,
) -> ScatteringRegressor<B> {
    let frontend = scattering_base(cfg, geometry, device);
    attach_head(
        frontend,
        &scattering_config(cfg, geometry),
        cfg.scattering.head,
        cfg.features.get(),
        cfg.hidden,
        cfg.dropout,
        device,
    )
}

pub fn vit<B: Backend>(cfg: &ExperimentConfig, geometry: MapGeometry, device: &B::Device) -> VitRegressor<B> {
    VitConfig::new(
        geometry.channels,
        cfg.features.get(),
        geometry.image_size,
        cfg.vit.patch_size,
        cfg.vit.d_model,
        cfg.dropout,
    )
    .with_num_heads(cfg.vit.num_heads)
    .with_num_layers(cfg.vit.num_layers)
    .init(device)
}

pub fn cnn<B: Backend>(cfg: &ExperimentConfig, geometry: MapGeometry, device: &B::Device) -> CnnRegressor<B> {
    CnnConfig::new(geometry.channels, cfg.features.get(), cfg.hidden, cfg.dropout, geometry.image_size)
        .init(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::regressor::MapRegressor;
    use burn::backend::NdArray;

    fn cfg(arch: Architecture) -> ExperimentConfig {
        let mut c = ExperimentConfig::example(std::path::Path::new("unused"));
        c.architecture = arch;
        c
    }

    #[test]
    fn test_geometry_checks() {
        let g = |image_size| MapGeometry { channels: 1, image_size };
        // J = 2 in the example config
        assert!(check_geometry(&cfg(Architecture::Scattering), g(16)).is_ok());
        assert!(check_geometry(&cfg(Architecture::Scattering), g(18)).is_err());
        assert!(check_geometry(&cfg(Architecture::Vit), g(18)).is_err());
        assert!(check_geometry(&cfg(Architecture::Cnn), g(18)).is_ok());
        assert!(check_geometry(&cfg(Architecture::Cnn), g(0)).is_err());
    }

    #[test]
    fn test_every_builder_matches_feature_count() {
        let device = Default::default();
        let geometry = MapGeometry { channels: 2, image_size: 16 };
        let x = || Tensor::<NdArray, 4>::zeros([1, 2, 16, 16], &device);

        let c = cfg(Architecture::Scattering);
        let f = c.features.get();
        assert_eq!(scattering_hybrid::<NdArray>(&c, geometry, &device).forward(x()).dims(), [1, f]);
        assert_eq!(vit::<NdArray>(&c, geometry, &device).forward(x()).dims(), [1, f]);
        assert_eq!(cnn::<NdArray>(&c, geometry, &device).forward(x()).dims(), [1, f]);
    }
}
