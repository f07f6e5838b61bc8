//! LSTM encoder-decoder that learns to reproduce its own input window.
//!
//! Shape flow for a batch of `B` windows of `L` steps and `F` features:
//!
//! ```text
//! (B, L, F) -> encoder LSTM -> last hidden (B, H) -> dropout
//!           -> repeat L times -> decoder LSTM -> (B, L, H) -> dropout
//!           -> shared Dense per step -> (B, L, F)
//! ```

pub mod dense;
pub mod lstm;
pub mod optimizer;
pub mod trainer;

use ndarray::{s, Array2, Array3, Axis};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use dense::TimeDistributedDense;
use lstm::{LstmLayer, LstmTrace};
use optimizer::Adam;

pub use trainer::{ConvergenceWarning, EarlyStopping, Trainer, TrainingReport};

/// Anything that maps windows to same-shaped reconstructions.
pub trait Reconstructor {
    fn reconstruct(&self, inputs: &Array3<f64>) -> Array3<f64>;
}

#[derive(Clone, Debug)]
pub struct LstmAutoencoder {
    encoder: LstmLayer,
    decoder: LstmLayer,
    head: TimeDistributedDense,
    window_len: usize,
    features: usize,
    dropout: f64,
}

struct ForwardPass {
    encoder: LstmTrace,
    latent_mask: Option<Array2<f64>>,
    decoder_input: Array2<f64>,
    decoder: LstmTrace,
    step_masks: Vec<Array2<f64>>,
    head_inputs: Vec<Array2<f64>>,
    output: Array3<f64>,
}

impl LstmAutoencoder {
    pub fn new(features: usize, window_len: usize, hidden_size: usize, dropout: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            encoder: LstmLayer::new(features, hidden_size, &mut rng),
            decoder: LstmLayer::new(hidden_size, hidden_size, &mut rng),
            head: TimeDistributedDense::new(hidden_size, features, &mut rng),
            window_len,
            features,
            dropout,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn features(&self) -> usize {
        self.features
    }

    pub fn hidden_size(&self) -> usize {
        self.encoder.hidden_size
    }

    /// Reconstruction with dropout disabled. Deterministic.
    pub fn predict(&self, inputs: &Array3<f64>) -> Array3<f64> {
        if inputs.len_of(Axis(0)) == 0 {
            return Array3::zeros(inputs.raw_dim());
        }
        self.forward(inputs, None).output
    }

    /// Fixed-size latent vector for each window, shape (windows, hidden).
    pub fn encode(&self, inputs: &Array3<f64>) -> Array2<f64> {
        let batch = inputs.len_of(Axis(0));
        let trace = self.encoder.forward(&split_steps(inputs));
        trace
            .last_output()
            .cloned()
            .unwrap_or_else(|| Array2::zeros((batch, self.hidden_size())))
    }

    /// Mean absolute error of the batch without updating anything.
    pub fn evaluate(&self, inputs: &Array3<f64>, targets: &Array3<f64>) -> f64 {
        mean_absolute_error(&self.predict(inputs), targets)
    }

    /// One forward/backward pass with dropout and an Adam update.
    /// Returns the batch loss measured before the update.
    pub(crate) fn train_step(
        &mut self,
        inputs: &Array3<f64>,
        targets: &Array3<f64>,
        adam: &mut Adam,
        rng: &mut StdRng,
    ) -> f64 {
        let pass = self.forward(inputs, Some(rng));
        let loss = mean_absolute_error(&pass.output, targets);

        let n = pass.output.len().max(1) as f64;
        let d_output = (&pass.output - targets).mapv(|d| sign(d) / n);
        let d_steps: Vec<Array2<f64>> = (0..d_output.len_of(Axis(1)))
            .map(|t| d_output.slice(s![.., t, ..]).to_owned())
            .collect();

        let (head_grads, d_head_inputs) = self.head.backward(&pass.head_inputs, &d_steps);
        let d_decoder_out: Vec<Array2<f64>> = d_head_inputs
            .into_iter()
            .zip(&pass.step_masks)
            .map(|(d, mask)| d * mask)
            .collect();

        let (decoder_grads, d_decoder_in) = self.decoder.backward(&pass.decoder, &d_decoder_out);
        let mut d_latent = Array2::<f64>::zeros(pass.decoder_input.raw_dim());
        for d in &d_decoder_in {
            d_latent += d;
        }
        if let Some(mask) = &pass.latent_mask {
            d_latent *= mask;
        }

        let mut d_encoder_out: Vec<Array2<f64>> = pass
            .encoder
            .outputs
            .iter()
            .map(|o| Array2::zeros(o.raw_dim()))
            .collect();
        if let Some(last) = d_encoder_out.last_mut() {
            *last = d_latent;
        }
        let (encoder_grads, _) = self.encoder.backward(&pass.encoder, &d_encoder_out);

        adam.begin_step();
        adam.update(0, &mut self.encoder.kernel, &encoder_grads.kernel);
        adam.update(1, &mut self.encoder.recurrent, &encoder_grads.recurrent);
        adam.update(2, &mut self.encoder.bias, &encoder_grads.bias);
        adam.update(3, &mut self.decoder.kernel, &decoder_grads.kernel);
        adam.update(4, &mut self.decoder.recurrent, &decoder_grads.recurrent);
        adam.update(5, &mut self.decoder.bias, &decoder_grads.bias);
        adam.update(6, &mut self.head.weights, &head_grads.weights);
        adam.update(7, &mut self.head.bias, &head_grads.bias);

        loss
    }

    fn forward(&self, inputs: &Array3<f64>, mut rng: Option<&mut StdRng>) -> ForwardPass {
        let (batch, len, _) = inputs.dim();
        let hidden = self.hidden_size();

        let encoder = self.encoder.forward(&split_steps(inputs));
        let latent = encoder
            .last_output()
            .cloned()
            .unwrap_or_else(|| Array2::zeros((batch, hidden)));

        let latent_mask = rng
            .as_deref_mut()
            .and_then(|r| dropout_mask((batch, hidden), self.dropout, r));
        let decoder_input = match &latent_mask {
            Some(mask) => &latent * mask,
            None => latent,
        };

        let repeated = vec![decoder_input.clone(); len];
        let decoder = self.decoder.forward(&repeated);

        let mut step_masks = Vec::with_capacity(len);
        let mut head_inputs = Vec::with_capacity(len);
        for h in &decoder.outputs {
            let mask = rng
                .as_deref_mut()
                .and_then(|r| dropout_mask((batch, hidden), self.dropout, r))
                .unwrap_or_else(|| Array2::ones((batch, hidden)));
            head_inputs.push(h * &mask);
            step_masks.push(mask);
        }

        let projected = self.head.forward(&head_inputs);
        let mut output = Array3::<f64>::zeros((batch, len, self.features));
        for (t, step) in projected.iter().enumerate() {
            output.slice_mut(s![.., t, ..]).assign(step);
        }

        ForwardPass {
            encoder,
            latent_mask,
            decoder_input,
            decoder,
            step_masks,
            head_inputs,
            output,
        }
    }
}

impl Reconstructor for LstmAutoencoder {
    fn reconstruct(&self, inputs: &Array3<f64>) -> Array3<f64> {
        self.predict(inputs)
    }
}

/// Mean of |prediction - target| over every element.
pub fn mean_absolute_error(prediction: &Array3<f64>, target: &Array3<f64>) -> f64 {
    if prediction.is_empty() {
        return 0.0;
    }
    (prediction - target).mapv(f64::abs).mean().unwrap_or(0.0)
}

pub(crate) fn glorot_uniform(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f64> {
    let limit = (6.0 / (rows + cols).max(1) as f64).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    Array2::from_shape_fn((rows, cols), |_| dist.sample(rng))
}

/// Inverted dropout: kept units are scaled by 1 / (1 - rate).
fn dropout_mask(shape: (usize, usize), rate: f64, rng: &mut StdRng) -> Option<Array2<f64>> {
    if rate <= 0.0 {
        return None;
    }
    let keep = 1.0 / (1.0 - rate);
    Some(Array2::from_shape_fn(shape, |_| {
        if rng.gen::<f64>() < rate {
            0.0
        } else {
            keep
        }
    }))
}

fn split_steps(inputs: &Array3<f64>) -> Vec<Array2<f64>> {
    (0..inputs.len_of(Axis(1)))
        .map(|t| inputs.slice(s![.., t, ..]).to_owned())
        .collect()
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
