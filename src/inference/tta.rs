use burn::prelude::*;
use burn::tensor::backend::Backend;

use crate::config::Dim;
use crate::error::{UnetError, UnetResult};

/// Spatial axes are counted in a `[batch, channel, spatial...]` layout, so
/// they start at index 2.
const FLIPS_2D: &[&[usize]] = &[&[2], &[3], &[2, 3]];
const FLIPS_3D: &[&[usize]] = &[&[2], &[3], &[4], &[2, 3], &[2, 4], &[3, 4], &[2, 3, 4]];

pub fn flip_axes(dim: Dim) -> &'static [&'static [usize]] {
    match dim {
        Dim::Two => FLIPS_2D,
        Dim::Three => FLIPS_3D,
    }
}

pub fn flip_axes_for(dim: usize) -> UnetResult<&'static [&'static [usize]]> {
    Ok(flip_axes(Dim::try_from(dim)?))
}

/// Mirrors `tensor` along every listed axis. Flips commute, so the order of
/// `axes` does not matter and applying the same set twice is the identity.
pub fn flip<B: Backend, const D: usize>(tensor: Tensor<B, D>, axes: &[usize]) -> Tensor<B, D> {
    axes.iter().fold(tensor, |acc, &axis| acc.flip([axis as isize]))
}

/// Averages a prediction over the identity view and every flipped view.
#[derive(Debug, Clone, Copy)]
pub struct TtaPredictor {
    dim: Dim,
}

impl TtaPredictor {
    pub fn new(dim: Dim) -> Self {
        TtaPredictor { dim }
    }

    pub fn num_views(&self) -> usize {
        flip_axes(self.dim).len() + 1
    }

    /// `forward` maps an input batch to logits of the same spatial layout.
    pub fn predict<B, const D: usize, F>(
        &self,
        input: Tensor<B, D>,
        mut forward: F,
    ) -> UnetResult<Tensor<B, D>>
    where
        B: Backend,
        F: FnMut(Tensor<B, D>) -> Tensor<B, D>,
    {
        if D != self.dim.as_usize() + 2 {
            return Err(UnetError::InvalidArgument(format!(
                "{}-D TTA expects a rank-{} tensor, got rank {}",
                self.dim,
                self.dim.as_usize() + 2,
                D
            )));
        }

        let mut prediction = forward(input.clone());
        for axes in flip_axes(self.dim) {
            let flipped = forward(flip(input.clone(), axes));
            prediction = prediction + flip(flipped, axes);
        }
        Ok(prediction / self.num_views() as f32)
    }
}
