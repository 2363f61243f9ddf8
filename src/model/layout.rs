//! Weight and batch layout conversions.
//!
//! Convolution weights are stored as `[out, in, spatial...]` (KCRS / KCRST).
//! Some accelerators want them filters-last (`[spatial..., in, out]`); these
//! helpers convert between the two and back.

use burn::prelude::*;
use burn::tensor::backend::Backend;

const TO_FILTERS_LAST_4D: [usize; 4] = [2, 3, 1, 0];
const FROM_FILTERS_LAST_4D: [usize; 4] = [3, 2, 0, 1];
const TO_FILTERS_LAST_5D: [usize; 5] = [2, 3, 4, 1, 0];
const FROM_FILTERS_LAST_5D: [usize; 5] = [4, 3, 0, 1, 2];

/// Axis order for a weight of rank `ndim`, or `None` when the rank has no
/// filters-last form (biases, norms).
pub fn filter_permutation(ndim: usize, to_filters_last: bool) -> Option<&'static [usize]> {
    match (ndim, to_filters_last) {
        (4, true) => Some(&TO_FILTERS_LAST_4D),
        (4, false) => Some(&FROM_FILTERS_LAST_4D),
        (5, true) => Some(&TO_FILTERS_LAST_5D),
        (5, false) => Some(&FROM_FILTERS_LAST_5D),
        _ => None,
    }
}

/// Ranks without a filters-last form keep their axis order.
fn permute_filters<B: Backend, const D: usize>(
    tensor: Tensor<B, D>,
    to_filters_last: bool,
) -> Tensor<B, D> {
    let mut axes: [isize; D] = core::array::from_fn(|axis| axis as isize);
    if let Some(order) = filter_permutation(D, to_filters_last) {
        for (axis, &from) in axes.iter_mut().zip(order) {
            *axis = from as isize;
        }
    }
    tensor.permute(axes)
}

pub fn permute_filters_4d<B: Backend>(tensor: Tensor<B, 4>, to_filters_last: bool) -> Tensor<B, 4> {
    permute_filters(tensor, to_filters_last)
}

pub fn permute_filters_5d<B: Backend>(tensor: Tensor<B, 5>, to_filters_last: bool) -> Tensor<B, 5> {
    permute_filters(tensor, to_filters_last)
}

/// Folds the depth axis of a `[batch, depth, channels, h, w]` stack into the
/// batch, giving 2-D slices. Labels come out as `[batch * depth, 1, h, w]`.
pub fn layout_2d<B: Backend>(
    img: Tensor<B, 5>,
    lbl: Option<Tensor<B, 5>>,
) -> (Tensor<B, 4>, Option<Tensor<B, 4>>) {
    let [batch_size, depth, channels, height, width] = img.dims();
    let img = img.reshape([batch_size * depth, channels, height, width]);
    let lbl = lbl.map(|lbl| lbl.reshape([batch_size * depth, 1, height, width]));
    (img, lbl)
}
