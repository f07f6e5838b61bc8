//! Adam (Adaptive Moment Estimation) with one moment slot per parameter tensor.

use ndarray::{Array, Dimension};

#[derive(Clone, Debug)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: i32,
    slots: Vec<Moments>,
}

#[derive(Clone, Debug, Default)]
struct Moments {
    m: Vec<f64>,
    v: Vec<f64>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            t: 0,
            slots: Vec::new(),
        }
    }

    /// Advances the timestep; call once per minibatch before the updates.
    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    pub fn update<D: Dimension>(&mut self, slot: usize, param: &mut Array<f64, D>, grad: &Array<f64, D>) {
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, Moments::default);
        }
        let moments = &mut self.slots[slot];
        if moments.m.len() != param.len() {
            moments.m = vec![0.0; param.len()];
            moments.v = vec![0.0; param.len()];
        }

        let t = self.t.max(1);
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (((p, g), m), v) in param
            .iter_mut()
            .zip(grad.iter())
            .zip(moments.m.iter_mut())
            .zip(moments.v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}
