// ============================================================
// Layer 4 — X-Ray Batcher
// ============================================================
// Implements Burn's Batcher trait to collate a Vec<XRayItem> into
// device tensors.
//
// Shapes produced for N items, image side S, C classes:
//   images   [N, 3, S, S]  float
//   labels   [N, C]        float (multi-hot)
//   captions [N, T]        int, T = longest caption in THIS batch
//   mask     [N, T]        float, 1 = real token, 0 = padding
//   lengths  Vec<usize>    caption length per item, before padding
//
// Captions have different lengths, so each one is right-padded
// with <pad> up to the longest caption of the batch:
//
//   [1, 9, 4, 2]       → [1, 9, 4, 2, 0, 0]
//   [1, 7, 7, 5, 8, 2] → [1, 7, 7, 5, 8, 2]
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::data::dataset::XRayItem;
use crate::infra::tokenizer_store::CaptionTokenizer;

/// A collated batch; all tensors have N as their first dimension.
#[derive(Debug, Clone)]
pub struct XRayBatch<B: Backend> {
    pub images:   Tensor<B, 4>,
    pub labels:   Tensor<B, 2>,
    pub captions: Tensor<B, 2, Int>,
    pub mask:     Tensor<B, 2>,
    pub lengths:  Vec<usize>,
    pub uids:     Vec<String>,
}

/// Stateless collator; tensors are created on the device the
/// DataLoader hands to `batch`.
#[derive(Clone, Debug, Default)]
pub struct XRayBatcher;

impl XRayBatcher {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Batcher<B, XRayItem, XRayBatch<B>> for XRayBatcher {
    fn batch(&self, items: Vec<XRayItem>, device: &B::Device) -> XRayBatch<B> {
        let batch_size  = items.len();
        let image_len   = items.first().map_or(0, |i| i.image.len());
        let side        = ((image_len / 3) as f64).sqrt() as usize;
        let num_classes = items.first().map_or(0, |i| i.labels.len());
        let lengths: Vec<usize> = items.iter().map(|i| i.tokens.len()).collect();
        let max_len     = lengths.iter().copied().max().unwrap_or(0);

        // ── Images ────────────────────────────────────────────────────────────
        let image_flat: Vec<f32> = items
            .iter()
            .flat_map(|i| i.image.iter().copied())
            .collect();
        let images = Tensor::<B, 4>::from_data(
            TensorData::new(image_flat, [batch_size, 3, side, side]),
            device,
        );

        // ── Labels ────────────────────────────────────────────────────────────
        let label_flat: Vec<f32> = items
            .iter()
            .flat_map(|i| i.labels.iter().copied())
            .collect();
        let labels = Tensor::<B, 2>::from_data(
            TensorData::new(label_flat, [batch_size, num_classes]),
            device,
        );

        // ── Captions + mask, right-padded to max_len ─────────────────────────
        let mut caption_flat = Vec::with_capacity(batch_size * max_len);
        let mut mask_flat    = Vec::with_capacity(batch_size * max_len);
        for item in &items {
            for t in 0..max_len {
                match item.tokens.get(t) {
                    Some(&id) => {
                        caption_flat.push(id as i64);
                        mask_flat.push(1.0f32);
                    }
                    None => {
                        caption_flat.push(CaptionTokenizer::PAD_ID as i64);
                        mask_flat.push(0.0);
                    }
                }
            }
        }
        let captions = Tensor::<B, 2, Int>::from_data(
            TensorData::new(caption_flat, [batch_size, max_len]),
            device,
        );
        let mask = Tensor::<B, 2>::from_data(
            TensorData::new(mask_flat, [batch_size, max_len]),
            device,
        );

        XRayBatch {
            images,
            labels,
            captions,
            mask,
            lengths,
            uids: items.into_iter().map(|i| i.uid).collect(),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn item(uid: &str, tokens: Vec<u32>) -> XRayItem {
        XRayItem {
            uid:    uid.to_string(),
            image:  vec![0.5; 3 * 2 * 2],
            labels: vec![1.0, 0.0, 1.0],
            tokens,
        }
    }

    #[test]
    fn test_batch_shapes_and_padding() {
        let device = Default::default();
        let batch: XRayBatch<TestBackend> = XRayBatcher::new().batch(
            vec![item("a", vec![1, 9, 4, 2]), item("b", vec![1, 7, 7, 5, 8, 2])],
            &device,
        );

        assert_eq!(batch.images.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.labels.dims(), [2, 3]);
        assert_eq!(batch.captions.dims(), [2, 6]);
        assert_eq!(batch.lengths, vec![4, 6]);
        assert_eq!(batch.uids, vec!["a", "b"]);

        let captions: Vec<i64> = batch.captions.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(&captions[..6], &[1, 9, 4, 2, 0, 0]);

        let mask: Vec<f32> = batch.mask.into_data().to_vec().unwrap();
        assert_eq!(&mask[..6], &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(mask[6..].iter().sum::<f32>(), 6.0);
    }
}
