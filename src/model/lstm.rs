//! Batched LSTM layer with full backpropagation through time.

use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;

use super::glorot_uniform;

/// LSTM layer. Gates are packed `[input, forget, cell, output]` along the
/// second axis of the kernel, recurrent kernel and bias.
#[derive(Clone, Debug)]
pub struct LstmLayer {
    pub input_size: usize,
    pub hidden_size: usize,
    /// (input_size, 4 * hidden_size)
    pub kernel: Array2<f64>,
    /// (hidden_size, 4 * hidden_size)
    pub recurrent: Array2<f64>,
    /// 4 * hidden_size
    pub bias: Array1<f64>,
}

/// Parameter gradients accumulated over a sequence.
#[derive(Clone, Debug)]
pub struct LstmGrads {
    pub kernel: Array2<f64>,
    pub recurrent: Array2<f64>,
    pub bias: Array1<f64>,
}

struct StepCache {
    x: Array2<f64>,
    h_prev: Array2<f64>,
    c_prev: Array2<f64>,
    i: Array2<f64>,
    f: Array2<f64>,
    g: Array2<f64>,
    o: Array2<f64>,
    tanh_c: Array2<f64>,
}

/// Everything a forward pass keeps for the backward pass.
pub struct LstmTrace {
    steps: Vec<StepCache>,
    /// Hidden state after each timestep, each (batch, hidden_size)
    pub outputs: Vec<Array2<f64>>,
}

impl LstmTrace {
    pub fn last_output(&self) -> Option<&Array2<f64>> {
        self.outputs.last()
    }
}

impl LstmLayer {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let gates = 4 * hidden_size;
        let mut bias = Array1::zeros(gates);
        // unit forget bias
        bias.slice_mut(s![hidden_size..2 * hidden_size]).fill(1.0);
        Self {
            input_size,
            hidden_size,
            kernel: glorot_uniform(input_size, gates, rng),
            recurrent: glorot_uniform(hidden_size, gates, rng),
            bias,
        }
    }

    /// Runs the layer over `inputs` (one (batch, input_size) matrix per
    /// timestep) from a zero initial state.
    pub fn forward(&self, inputs: &[Array2<f64>]) -> LstmTrace {
        let h = self.hidden_size;
        let batch = inputs.first().map(|x| x.nrows()).unwrap_or(0);
        let mut h_prev = Array2::<f64>::zeros((batch, h));
        let mut c_prev = Array2::<f64>::zeros((batch, h));
        let mut steps = Vec::with_capacity(inputs.len());
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let pre = x.dot(&self.kernel) + h_prev.dot(&self.recurrent) + &self.bias;
            let i = pre.slice(s![.., 0..h]).mapv(sigmoid);
            let f = pre.slice(s![.., h..2 * h]).mapv(sigmoid);
            let g = pre.slice(s![.., 2 * h..3 * h]).mapv(f64::tanh);
            let o = pre.slice(s![.., 3 * h..4 * h]).mapv(sigmoid);

            let c = &f * &c_prev + &i * &g;
            let tanh_c = c.mapv(f64::tanh);
            let h_next = &o * &tanh_c;

            steps.push(StepCache {
                x: x.clone(),
                h_prev: std::mem::replace(&mut h_prev, h_next.clone()),
                c_prev: std::mem::replace(&mut c_prev, c),
                i,
                f,
                g,
                o,
                tanh_c,
            });
            outputs.push(h_next);
        }

        LstmTrace { steps, outputs }
    }

    /// Backpropagates `d_outputs` (loss gradient w.r.t. each step's hidden
    /// output) through `trace`. Returns parameter gradients and the gradient
    /// w.r.t. each step's input.
    pub fn backward(&self, trace: &LstmTrace, d_outputs: &[Array2<f64>]) -> (LstmGrads, Vec<Array2<f64>>) {
        let h = self.hidden_size;
        let mut grads = self.zero_grads();
        let mut d_inputs = vec![Array2::<f64>::zeros((0, 0)); trace.steps.len()];

        let batch = trace.steps.first().map(|c| c.x.nrows()).unwrap_or(0);
        let mut dh_next = Array2::<f64>::zeros((batch, h));
        let mut dc_next = Array2::<f64>::zeros((batch, h));
        let mut d_pre = Array2::<f64>::zeros((batch, 4 * h));

        for (t, step) in trace.steps.iter().enumerate().rev() {
            let dh = &d_outputs[t] + &dh_next;
            let dc = &dc_next + &(&dh * &step.o * &step.tanh_c.mapv(|v| 1.0 - v * v));

            let d_o = &dh * &step.tanh_c;
            let d_i = &dc * &step.g;
            let d_g = &dc * &step.i;
            let d_f = &dc * &step.c_prev;
            dc_next = &dc * &step.f;

            d_pre
                .slice_mut(s![.., 0..h])
                .assign(&(&d_i * &step.i.mapv(|v| v * (1.0 - v))));
            d_pre
                .slice_mut(s![.., h..2 * h])
                .assign(&(&d_f * &step.f.mapv(|v| v * (1.0 - v))));
            d_pre
                .slice_mut(s![.., 2 * h..3 * h])
                .assign(&(&d_g * &step.g.mapv(|v| 1.0 - v * v)));
            d_pre
                .slice_mut(s![.., 3 * h..4 * h])
                .assign(&(&d_o * &step.o.mapv(|v| v * (1.0 - v))));

            grads.kernel += &step.x.t().dot(&d_pre);
            grads.recurrent += &step.h_prev.t().dot(&d_pre);
            grads.bias += &d_pre.sum_axis(Axis(0));

            d_inputs[t] = d_pre.dot(&self.kernel.t());
            dh_next = d_pre.dot(&self.recurrent.t());
        }

        (grads, d_inputs)
    }

    fn zero_grads(&self) -> LstmGrads {
        LstmGrads {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent: Array2::zeros(self.recurrent.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn sequence(batch: usize, steps: usize, features: usize) -> Vec<Array2<f64>> {
        (0..steps)
            .map(|t| {
                Array2::from_shape_fn((batch, features), |(b, f)| {
                    ((t * 7 + b * 3 + f) as f64 * 0.37).sin()
                })
            })
            .collect()
    }

    fn sum_of_outputs(layer: &LstmLayer, inputs: &[Array2<f64>]) -> f64 {
        layer.forward(inputs).outputs.iter().map(|o| o.sum()).sum()
    }

    #[test]
    fn forward_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LstmLayer::new(3, 5, &mut rng);
        let trace = layer.forward(&sequence(2, 4, 3));
        assert_eq!(trace.outputs.len(), 4);
        assert_eq!(trace.last_output().unwrap().dim(), (2, 5));
    }

    #[test]
    fn forget_bias_starts_at_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let layer = LstmLayer::new(1, 3, &mut rng);
        assert_eq!(layer.bias.slice(s![3..6]).to_vec(), vec![1.0; 3]);
        assert_eq!(layer.bias.slice(s![0..3]).sum(), 0.0);
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(7);
        let layer = LstmLayer::new(2, 3, &mut rng);
        let inputs = sequence(2, 4, 2);
        let trace = layer.forward(&inputs);
        let d_outputs: Vec<_> = trace.outputs.iter().map(|o| Array2::ones(o.raw_dim())).collect();
        let (grads, d_inputs) = layer.backward(&trace, &d_outputs);

        let eps = 1e-6;
        for &(r, c) in &[(0usize, 0usize), (1, 5), (0, 11)] {
            let mut plus = layer.clone();
            plus.kernel[[r, c]] += eps;
            let mut minus = layer.clone();
            minus.kernel[[r, c]] -= eps;
            let numeric = (sum_of_outputs(&plus, &inputs) - sum_of_outputs(&minus, &inputs)) / (2.0 * eps);
            assert!((numeric - grads.kernel[[r, c]]).abs() < 1e-5, "kernel[{},{}]", r, c);
        }
        for &(r, c) in &[(0usize, 2usize), (2, 9)] {
            let mut plus = layer.clone();
            plus.recurrent[[r, c]] += eps;
            let mut minus = layer.clone();
            minus.recurrent[[r, c]] -= eps;
            let numeric = (sum_of_outputs(&plus, &inputs) - sum_of_outputs(&minus, &inputs)) / (2.0 * eps);
            assert!((numeric - grads.recurrent[[r, c]]).abs() < 1e-5, "recurrent[{},{}]", r, c);
        }

        let mut shifted = inputs.clone();
        shifted[1][[0, 1]] += eps;
        let mut lowered = inputs.clone();
        lowered[1][[0, 1]] -= eps;
        let numeric = (sum_of_outputs(&layer, &shifted) - sum_of_outputs(&layer, &lowered)) / (2.0 * eps);
        assert!((numeric - d_inputs[1][[0, 1]]).abs() < 1e-5);
    }
}
