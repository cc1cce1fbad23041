use ndarray::prelude::*;
use ndarray::Zip;

use crate::errors::{Result, SegError};

/// Per-pixel class labels, `(height, width)`, row-major.
pub type LabelMap = Array2<u32>;

/// Reduce a channel-major `(C, H, W)` score tensor to one label per pixel.
///
/// The running maximum starts at negative infinity and is only replaced on a
/// strictly greater score, scanning channels in ascending order:
///
/// * ties go to the lowest channel index,
/// * NaN never wins a comparison, so a pixel whose scores are all NaN keeps label 0.
///
/// Channels are walked in the outer loop so each pass reads one contiguous plane.
pub fn decode(scores: ArrayView3<f32>) -> Result<LabelMap> {
    let (channels, height, width) = scores.dim();
    if channels == 0 {
        return Err(SegError::invalid_input("score tensor", "has no class channels"));
    }
    if height == 0 || width == 0 {
        return Err(SegError::invalid_input(
            "score tensor",
            format!("has an empty spatial extent ({}x{})", width, height),
        ));
    }
    if channels > u32::MAX as usize {
        return Err(SegError::invalid_input(
            "score tensor",
            format!("has too many channels ({})", channels),
        ));
    }

    let mut best = Array2::<f32>::from_elem((height, width), f32::NEG_INFINITY);
    let mut labels = LabelMap::zeros((height, width));

    for (channel, plane) in scores.outer_iter().enumerate() {
        let channel = channel as u32;
        Zip::from(&mut best)
            .and(&mut labels)
            .and(&plane)
            .for_each(|best, label, &score| {
                if score > *best {
                    *best = score;
                    *label = channel;
                }
            });
    }

    Ok(labels)
}
