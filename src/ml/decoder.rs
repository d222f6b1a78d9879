use anyhow::{anyhow, Result};
use burn::{
    nn::{
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig, Lstm,
        LstmConfig, LstmState,
    },
    prelude::*,
    tensor::TensorData,
};
use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

use crate::infra::tokenizer_store::CaptionTokenizer;

#[derive(Config, Debug)]
pub struct DecoderRnnConfig {
    pub embed_size:  usize,
    pub hidden_size: usize,
    pub vocab_size:  usize,
    pub num_layers:  usize,
    /// Applied between stacked LSTM layers
    #[config(default = 0.0)]
    pub dropout: f64,
}

impl DecoderRnnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DecoderRnn<B> {
        let layers = (0..self.num_layers.max(1))
            .map(|i| {
                let d_input = if i == 0 { self.embed_size } else { self.hidden_size };
                LstmConfig::new(d_input, self.hidden_size, true).init(device)
            })
            .collect();
        DecoderRnn {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embed_size).init(device),
            layers,
            dropout:   DropoutConfig::new(self.dropout).init(),
            output:    LinearConfig::new(self.hidden_size, self.vocab_size).init(device),
        }
    }
}

/// How `sample` picks the next token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeStrategy {
    Greedy,
    /// Draw from softmax(logits / temperature)
    Sample { temperature: f32 },
}

impl DecodeStrategy {
    /// A non-positive temperature means greedy.
    pub fn from_temperature(temperature: f32) -> Self {
        if temperature > 0.0 {
            Self::Sample { temperature }
        } else {
            Self::Greedy
        }
    }
}

#[derive(Module, Debug)]
pub struct DecoderRnn<B: Backend> {
    pub embedding: Embedding<B>,
    pub layers:    Vec<Lstm<B>>,
    pub dropout:   Dropout,
    pub output:    Linear<B>,
}

impl<B: Backend> DecoderRnn<B> {
    /// Training pass over the ground-truth caption.
    ///
    /// features: [batch, embed], captions: [batch, seq] → logits [batch, seq, vocab]
    ///
    /// Step 0 sees the image features, step t sees caption token t-1,
    /// so the logits at position t score caption token t.
    pub fn forward(&self, features: Tensor<B, 2>, captions: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, seq] = captions.dims();
        let first = features.unsqueeze_dim::<3>(1);

        let inputs = if seq > 1 {
            let shifted = captions.slice([0..batch, 0..seq - 1]);
            Tensor::cat(vec![first, self.embedding.forward(shifted)], 1)
        } else {
            first
        };

        let (hidden, _) = self.run_layers(inputs, None);
        self.output.forward(hidden)
    }

    /// Autoregressive decoding from image features.
    ///
    /// Returns the raw token ids per row, including `<end>` when one was
    /// produced. Stops early once every row has emitted `<end>`.
    pub fn sample<R: Rng>(
        &self,
        features: Tensor<B, 2>,
        max_len:  usize,
        strategy: DecodeStrategy,
        rng:      &mut R,
    ) -> Result<Vec<Vec<u32>>> {
        let [batch, _] = features.dims();
        let device = features.device();

        let mut tokens: Vec<Vec<u32>> = vec![Vec::new(); batch];
        let mut done = vec![false; batch];
        let mut states: Option<Vec<LstmState<B, 2>>> = None;
        let mut input = features.unsqueeze_dim::<3>(1);

        for _ in 0..max_len {
            let (hidden, next) = self.run_layers(input, states.take());
            states = Some(next);

            let vocab  = self.output.weight.dims()[1];
            let logits = self.output.forward(hidden).reshape([batch, vocab]);
            let values: Vec<f32> = logits
                .into_data()
                .to_vec()
                .map_err(|e| anyhow!("Failed to read decoder logits: {e:?}"))?;

            let mut picked = Vec::with_capacity(batch);
            for (row, scores) in values.chunks(vocab).enumerate() {
                let id = choose(scores, strategy, rng)?;
                if !done[row] {
                    tokens[row].push(id);
                    done[row] = id == CaptionTokenizer::END_ID;
                }
                picked.push(id as i64);
            }
            if done.iter().all(|&d| d) {
                break;
            }

            let ids = Tensor::<B, 2, Int>::from_data(TensorData::new(picked, [batch, 1]), &device);
            input = self.embedding.forward(ids);
        }

        Ok(tokens)
    }

    /// Run the LSTM stack; `states` carries one state per layer.
    fn run_layers(
        &self,
        inputs: Tensor<B, 3>,
        states: Option<Vec<LstmState<B, 2>>>,
    ) -> (Tensor<B, 3>, Vec<LstmState<B, 2>>) {
        let mut prev: Vec<Option<LstmState<B, 2>>> =
            states.map_or_else(Vec::new, |s| s.into_iter().map(Some).collect());
        let mut x = inputs;
        let mut next_states = Vec::with_capacity(self.layers.len());

        for (i, lstm) in self.layers.iter().enumerate() {
            if i > 0 {
                x = self.dropout.forward(x);
            }
            let state_in = prev.get_mut(i).and_then(Option::take);
            let (out, state) = lstm.forward(x, state_in);
            next_states.push(state);
            x = out;
        }
        (x, next_states)
    }
}

fn choose<R: Rng>(scores: &[f32], strategy: DecodeStrategy, rng: &mut R) -> Result<u32> {
    match strategy {
        DecodeStrategy::Greedy => Ok(argmax(scores)),
        DecodeStrategy::Sample { temperature } => {
            let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let weights: Vec<f32> = scores
                .iter()
                .map(|s| ((s - max) / temperature).exp())
                .collect();
            let dist = WeightedIndex::new(&weights)
                .map_err(|e| anyhow!("Cannot sample from decoder distribution: {e}"))?;
            Ok(dist.sample(rng) as u32)
        }
    }
}

fn argmax(scores: &[f32]) -> u32 {
    scores
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map_or(0, |(i, _)| i as u32)
}
