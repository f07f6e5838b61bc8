use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;

use super::glorot_uniform;

/// Linear projection shared by every timestep of the decoded sequence.
#[derive(Clone, Debug)]
pub struct TimeDistributedDense {
    /// (input_size, output_size)
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

#[derive(Clone, Debug)]
pub struct DenseGrads {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl TimeDistributedDense {
    pub fn new(input_size: usize, output_size: usize, rng: &mut StdRng) -> Self {
        Self {
            weights: glorot_uniform(input_size, output_size, rng),
            bias: Array1::zeros(output_size),
        }
    }

    /// Projects each (batch, input_size) step to (batch, output_size).
    pub fn forward(&self, steps: &[Array2<f64>]) -> Vec<Array2<f64>> {
        steps.iter().map(|x| x.dot(&self.weights) + &self.bias).collect()
    }

    /// Gradients summed over all steps, plus the gradient w.r.t. each input step.
    pub fn backward(&self, steps: &[Array2<f64>], d_outputs: &[Array2<f64>]) -> (DenseGrads, Vec<Array2<f64>>) {
        let mut grads = DenseGrads {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        };
        let mut d_inputs = Vec::with_capacity(steps.len());
        for (x, dy) in steps.iter().zip(d_outputs) {
            grads.weights += &x.t().dot(dy);
            grads.bias += &dy.sum_axis(Axis(0));
            d_inputs.push(dy.dot(&self.weights.t()));
        }
        (grads, d_inputs)
    }
}
