use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, LayerNorm, LayerNormConfig,
        Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct EncoderCnnConfig {
    /// Size of the feature vector handed to the decoder
    pub embed_size:  usize,
    /// Number of problem classes
    pub num_classes: usize,
    /// Channels of the first stage; stages use c, 2c, 4c, 8c
    #[config(default = 32)]
    pub base_channels: usize,
    /// Residual blocks per stage
    #[config(default = 2)]
    pub blocks_per_stage: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
}

impl EncoderCnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EncoderCnn<B> {
        let c = self.base_channels;
        let stem = ConvBn::new(3, c, 7, 2, device);
        let stem_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        // Stage 1 keeps resolution; stages 2-4 halve it and double channels
        let widths  = [c, 2 * c, 4 * c, 8 * c];
        let strides = [1, 2, 2, 2];
        let mut blocks = Vec::new();
        let mut in_ch = c;
        for (&out_ch, &stride) in widths.iter().zip(&strides) {
            for b in 0..self.blocks_per_stage.max(1) {
                let s = if b == 0 { stride } else { 1 };
                blocks.push(ResidualBlock::new(in_ch, out_ch, s, device));
                in_ch = out_ch;
            }
        }

        EncoderCnn {
            stem,
            stem_pool,
            blocks,
            pool:       AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout:    DropoutConfig::new(self.dropout).init(),
            classifier: LinearConfig::new(in_ch, self.num_classes).init(device),
            embed:      LinearConfig::new(in_ch, self.embed_size).init(device),
            embed_norm: LayerNormConfig::new(self.embed_size).init(device),
        }
    }
}

/// Conv2d (no bias) + BatchNorm; activation is applied by the caller.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn:   BatchNorm<B>,
}

impl<B: Backend> ConvBn<B> {
    pub fn new(c_in: usize, c_out: usize, k: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([c_in, c_out], [k, k])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(k / 2, k / 2))
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(c_out).init(device);
        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3×3 ConvBn layers with an identity (or 1×1 projection) shortcut.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1:    ConvBn<B>,
    conv2:    ConvBn<B>,
    shortcut: Option<ConvBn<B>>,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn new(c_in: usize, c_out: usize, stride: usize, device: &B::Device) -> Self {
        let shortcut = (stride != 1 || c_in != c_out)
            .then(|| ConvBn::new(c_in, c_out, 1, stride, device));
        Self {
            conv1: ConvBn::new(c_in, c_out, 3, stride, device),
            conv2: ConvBn::new(c_out, c_out, 3, 1, device),
            shortcut,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = match &self.shortcut {
            Some(proj) => proj.forward(x.clone()),
            None => x.clone(),
        };
        let out = relu(self.conv1.forward(x));
        let out = self.conv2.forward(out);
        relu(out + residual)
    }
}

#[derive(Module, Debug)]
pub struct EncoderCnn<B: Backend> {
    pub stem:       ConvBn<B>,
    pub stem_pool:  MaxPool2d,
    pub blocks:     Vec<ResidualBlock<B>>,
    pub pool:       AdaptiveAvgPool2d,
    pub dropout:    Dropout,
    pub classifier: Linear<B>,
    pub embed:      Linear<B>,
    pub embed_norm: LayerNorm<B>,
}

pub struct EncoderOutput<B: Backend> {
    /// Per-class logits: [batch, num_classes]
    pub logits:   Tensor<B, 2>,
    /// Decoder conditioning vector: [batch, embed_size]
    pub features: Tensor<B, 2>,
}

impl<B: Backend> EncoderCnn<B> {
    /// images: [batch, 3, H, W] → logits [batch, classes], features [batch, embed]
    pub fn forward(&self, images: Tensor<B, 4>) -> EncoderOutput<B> {
        let x = relu(self.stem.forward(images));
        let mut x = self.stem_pool.forward(x);
        for block in &self.blocks {
            x = block.forward(x);
        }

        // [batch, C, 1, 1] → [batch, C]
        let pooled: Tensor<B, 2> = self.pool.forward(x).flatten(1, 3);
        let pooled = self.dropout.forward(pooled);

        let logits   = self.classifier.forward(pooled.clone());
        let features = self.embed_norm.forward(self.embed.forward(pooled));
        EncoderOutput { logits, features }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_output_shapes() {
        let device = Default::default();
        let encoder: EncoderCnn<TestBackend> = EncoderCnnConfig::new(16, 5)
            .with_base_channels(4)
            .with_blocks_per_stage(1)
            .init(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let out = encoder.forward(images);
        assert_eq!(out.logits.dims(), [2, 5]);
        assert_eq!(out.features.dims(), [2, 16]);
    }

    #[test]
    fn test_block_layout() {
        let device = Default::default();
        let encoder: EncoderCnn<TestBackend> = EncoderCnnConfig::new(8, 3)
            .with_base_channels(4)
            .init(&device);
        // 4 stages × 2 blocks; only the first block of stages 2-4 downsamples
        assert_eq!(encoder.blocks.len(), 8);
        let projections = encoder.blocks.iter().filter(|b| b.shortcut.is_some()).count();
        assert_eq!(projections, 3);
    }
}
