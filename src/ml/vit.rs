use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        conv::{Conv2d, Conv2dConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::ml::regressor::{LearnableFilters, MapRegressor};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally, so do NOT add them again or the impls conflict.
#[derive(Config, Debug)]
pub struct VitConfig {
    pub channels:   usize,
    pub features:   usize,
    pub image_size: usize,
    pub patch_size: usize,
    pub d_model:    usize,
    pub dropout:    f64,
    #[config(default = 4)]
    pub num_heads:  usize,
    #[config(default = 4)]
    pub num_layers: usize,
}

impl VitConfig {
    pub fn num_patches(&self) -> usize {
        let per_side = self.image_size / self.patch_size;
        per_side * per_side
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> VitRegressor<B> {
        // Non-overlapping patches: kernel = stride = patch size
        let patch_embed = Conv2dConfig::new([self.channels, self.d_model], [self.patch_size, self.patch_size])
            .with_stride([self.patch_size, self.patch_size])
            .init(device);
        let num_patches        = self.num_patches();
        let position_embedding = EmbeddingConfig::new(num_patches, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        VitRegressor {
            patch_embed,
            position_embedding,
            layers,
            final_norm: LayerNormConfig::new(self.d_model).init(device),
            head:       LinearConfig::new(self.d_model, self.features).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
            num_patches,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let d_ff = 4 * self.d_model;
        EncoderBlock {
            self_attn: MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            ffn_linear1: LinearConfig::new(self.d_model, d_ff).init(device),
            ffn_linear2: LinearConfig::new(d_ff, self.d_model).init(device),
            norm1:   LayerNormConfig::new(self.d_model).init(device),
            norm2:   LayerNormConfig::new(self.d_model).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Attention + GELU feed-forward, each with residual and layer norm.
#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let attn_output = self.self_attn.forward(MhaInput::self_attn(x.clone())).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct VitRegressor<B: Backend> {
    pub patch_embed:        Conv2d<B>,
    pub position_embedding: Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub head:               Linear<B>,
    pub dropout:            Dropout,
    pub num_patches:        usize,
}

impl<B: Backend> MapRegressor<B> for VitRegressor<B> {
    /// maps: [batch, C, H, W] → [batch, features]
    fn forward(&self, maps: Tensor<B, 4>) -> Tensor<B, 2> {
        let patches = self.patch_embed.forward(maps); // [batch, d_model, h, w]
        let [batch_size, d_model, _, _] = patches.dims();

        let tokens = patches
            .flatten::<3>(2, 3)  // [batch, d_model, patches]
            .swap_dims(1, 2);    // [batch, patches, d_model]
        let num_tokens = tokens.dims()[1];

        // Attention is permutation-invariant, so patch position is injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..num_tokens as i64, &tokens.device())
            .unsqueeze::<2>()
            .expand([batch_size, num_tokens]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(tokens + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x);
        }
        let x = self.final_norm.forward(x);

        // Mean over tokens → one vector per map
        let pooled = x.mean_dim(1).reshape([batch_size, d_model]);
        self.head.forward(pooled)
    }
}

impl<B: AutodiffBackend> LearnableFilters<B> for VitRegressor<B> {}
