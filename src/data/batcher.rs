// ============================================================
// Layer 4 - Map Batcher
// ============================================================
// Implements Burn's Batcher trait: stacks a Vec<MapSample> into
// one image tensor and one label tensor.
//
//   Input:  N samples, each [C, H, W] + 6 parameters
//   Output: maps [N, C, H, W], params [N, 6]
//
// All samples of a suite share the same shape, so the buffers
// are simply concatenated and reshaped.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::MapSample;
use crate::domain::parameters::NUM_PARAMETERS;

/// A batch of maps and their labels.
#[derive(Debug, Clone)]
pub struct MapBatch<B: Backend> {
    /// Shape: [batch_size, channels, height, width]
    pub maps: Tensor<B, 4>,

    /// Normalised parameters, shape: [batch_size, 6]
    pub params: Tensor<B, 2>,
}

impl<B: Backend> MapBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.maps.dims()[0]
    }
}

/// Holds the target device so tensors land on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct MapBatcher<B: Backend> {
    pub device:   B::Device,
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl<B: Backend> MapBatcher<B> {
    pub fn new(device: B::Device, channels: usize, height: usize, width: usize) -> Self {
        Self { device, channels, height, width }
    }
}

impl<B: Backend> Batcher<MapSample, MapBatch<B>> for MapBatcher<B> {
    fn batch(&self, items: Vec<MapSample>) -> MapBatch<B> {
        let batch_size = items.len();

        let map_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.map.iter().copied())
            .collect();

        let param_flat: Vec<f32> = items
            .iter()
            .flat_map(|s| s.params.iter().copied())
            .collect();

        let maps = Tensor::<B, 1>::from_floats(map_flat.as_slice(), &self.device)
            .reshape([batch_size, self.channels, self.height, self.width]);

        let params = Tensor::<B, 1>::from_floats(param_flat.as_slice(), &self.device)
            .reshape([batch_size, NUM_PARAMETERS]);

        MapBatch { maps, params }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes_and_order() {
        let device  = Default::default();
        let batcher = MapBatcher::<NdArray>::new(device, 2, 3, 3);

        let items: Vec<MapSample> = (0..4)
            .map(|i| MapSample {
                map:    vec![i as f32; 2 * 3 * 3],
                params: [i as f32 * 0.1; NUM_PARAMETERS],
            })
            .collect();

        let batch = batcher.batch(items);
        assert_eq!(batch.maps.dims(), [4, 2, 3, 3]);
        assert_eq!(batch.params.dims(), [4, NUM_PARAMETERS]);
        assert_eq!(batch.batch_size(), 4);

        let params: Vec<f32> = batch.params.into_data().to_vec().unwrap();
        assert!((params[3 * NUM_PARAMETERS] - 0.3).abs() < 1e-6);
    }
}
