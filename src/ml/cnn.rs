use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig,
        Dropout, DropoutConfig,
        Linear, LinearConfig,
        PaddingConfig2d,
    },
    prelude::*,
    tensor::{activation::leaky_relu, backend::AutodiffBackend},
};

use crate::ml::regressor::{LearnableFilters, MapRegressor};

const LEAKY_SLOPE: f64 = 0.2;

/// Spatial size at which the CNN stops halving the map.
const MIN_SPATIAL: usize = 4;

/// 3x3 conv, then either a 2x2 stride-2 conv (halves H and W) or a
/// second 3x3 conv, then batch norm. Leaky ReLU after each stage.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub down: Conv2d<B>,
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, downsample: bool, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let down = if downsample {
            Conv2dConfig::new([out_channels, out_channels], [2, 2])
                .with_stride([2, 2])
                .init(device)
        } else {
            Conv2dConfig::new([out_channels, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device)
        };
        let norm = BatchNormConfig::new(out_channels).init(device);
        Self { conv, down, norm }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = leaky_relu(self.conv.forward(x), LEAKY_SLOPE);
        let x = self.norm.forward(self.down.forward(x));
        leaky_relu(x, LEAKY_SLOPE)
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct CnnConfig {
    pub channels:   usize,
    pub features:   usize,
    pub hidden:     usize,
    pub dropout:    f64,
    pub image_size: usize,
}

/// Stride-2 blocks with doubling widths until the map is MIN_SPATIAL
/// wide (at least one block). Returns the blocks and their output width.
pub fn conv_stack<B: Backend>(
    in_channels: usize,
    width:       usize,
    spatial:     usize,
    device:      &B::Device,
) -> (Vec<ConvBlock<B>>, usize) {
    let mut blocks  = Vec::new();
    let mut in_ch   = in_channels;
    let mut width   = width;
    let mut spatial = spatial;

    while spatial > MIN_SPATIAL {
        blocks.push(ConvBlock::new(in_ch, width, true, device));
        in_ch    = width;
        width   *= 2;
        spatial /= 2;
    }
    if blocks.is_empty() {
        blocks.push(ConvBlock::new(in_ch, width, false, device));
        in_ch = width;
    }
    (blocks, in_ch)
}

impl CnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CnnRegressor<B> {
        let (blocks, in_ch) = conv_stack(self.channels, self.hidden, self.image_size, device);

        CnnRegressor {
            blocks,
            pool:    AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc1:     LinearConfig::new(in_ch, 2 * self.hidden).init(device),
            fc2:     LinearConfig::new(2 * self.hidden, self.features).init(device),
        }
    }
}

/// Strided CNN: conv blocks down to 4x4, global average, two linear layers.
#[derive(Module, Debug)]
pub struct CnnRegressor<B: Backend> {
    pub blocks:  Vec<ConvBlock<B>>,
    pub pool:    AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub fc1:     Linear<B>,
    pub fc2:     Linear<B>,
}

impl<B: Backend> MapRegressor<B> for CnnRegressor<B> {
    fn forward(&self, maps: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = maps;
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x: Tensor<B, 2> = self.pool.forward(x).flatten(1, 3);
        let x = leaky_relu(self.fc1.forward(self.dropout.forward(x)), LEAKY_SLOPE);
        self.fc2.forward(self.dropout.forward(x))
    }
}

impl<B: AutodiffBackend> LearnableFilters<B> for CnnRegressor<B> {}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model: CnnRegressor<NdArray> = CnnConfig::new(2, 12, 4, 0.1, 16).init(&device);
        // 16 → 8 → 4
        assert_eq!(model.blocks.len(), 2);

        let x = Tensor::<NdArray, 4>::zeros([3, 2, 16, 16], &device);
        assert_eq!(model.forward(x).dims(), [3, 12]);
    }

    #[test]
    fn test_tiny_maps_still_get_one_block() {
        let device = Default::default();
        let model: CnnRegressor<NdArray> = CnnConfig::new(1, 2, 4, 0.0, 4).init(&device);
        assert_eq!(model.blocks.len(), 1);
        let x = Tensor::<NdArray, 4>::ones([2, 1, 4, 4], &device);
        assert_eq!(model.forward(x).dims(), [2, 2]);
    }
}
