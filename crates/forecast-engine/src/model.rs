use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const GRAD_CLIP_NORM: f64 = 1.0;

/// Single-layer recurrent network (tanh hidden state, linear head) over
/// a scalar input sequence. Small enough to train in-process with plain
/// backpropagation through time; weight init is seeded so retraining on
/// an unchanged series reproduces the same model.
pub struct RecurrentNet {
    hidden: usize,
    w_in: DVector<f64>,
    w_h: DMatrix<f64>,
    b_h: DVector<f64>,
    w_out: DVector<f64>,
    b_out: f64,
}

struct Grads {
    w_in: DVector<f64>,
    w_h: DMatrix<f64>,
    b_h: DVector<f64>,
    w_out: DVector<f64>,
    b_out: f64,
}

impl Grads {
    fn zeros(hidden: usize) -> Self {
        Self {
            w_in: DVector::zeros(hidden),
            w_h: DMatrix::zeros(hidden, hidden),
            b_h: DVector::zeros(hidden),
            w_out: DVector::zeros(hidden),
            b_out: 0.0,
        }
    }

    fn norm(&self) -> f64 {
        (self.w_in.norm_squared()
            + self.w_h.norm_squared()
            + self.b_h.norm_squared()
            + self.w_out.norm_squared()
            + self.b_out * self.b_out)
            .sqrt()
    }

    fn scale_mut(&mut self, factor: f64) {
        self.w_in *= factor;
        self.w_h *= factor;
        self.b_h *= factor;
        self.w_out *= factor;
        self.b_out *= factor;
    }
}

impl RecurrentNet {
    pub fn new(hidden: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (hidden as f64).sqrt();
        let sample = |rng: &mut StdRng| rng.gen_range(-scale..scale);

        Self {
            hidden,
            w_in: DVector::from_fn(hidden, |_, _| sample(&mut rng)),
            w_h: DMatrix::from_fn(hidden, hidden, |_, _| sample(&mut rng)),
            b_h: DVector::zeros(hidden),
            w_out: DVector::from_fn(hidden, |_, _| sample(&mut rng)),
            b_out: 0.0,
        }
    }

    fn forward_states(&self, window: &[f64]) -> Vec<DVector<f64>> {
        let mut h = DVector::zeros(self.hidden);
        let mut states = Vec::with_capacity(window.len());
        for &x in window {
            let pre = &self.w_in * x + &self.w_h * &h + &self.b_h;
            h = pre.map(f64::tanh);
            states.push(h.clone());
        }
        states
    }

    /// One-step-ahead prediction from a window of normalized values.
    pub fn predict(&self, window: &[f64]) -> f64 {
        match self.forward_states(window).last() {
            Some(h) => self.w_out.dot(h) + self.b_out,
            None => self.b_out,
        }
    }

    /// Backpropagation through time for one (window, target) sample.
    /// Returns the gradients and the squared-error loss.
    fn backward(&self, window: &[f64], target: f64) -> (Grads, f64) {
        let states = self.forward_states(window);
        let h_last = states.last().expect("window must be non-empty");
        let y = self.w_out.dot(h_last) + self.b_out;
        let dy = y - target;

        let mut grads = Grads::zeros(self.hidden);
        grads.w_out = h_last.scale(dy);
        grads.b_out = dy;

        let mut dh = self.w_out.scale(dy);
        for t in (0..window.len()).rev() {
            let h_t = &states[t];
            let dpre = dh.component_mul(&h_t.map(|v| 1.0 - v * v));

            grads.b_h += &dpre;
            grads.w_in += dpre.scale(window[t]);
            if t > 0 {
                grads.w_h += &dpre * states[t - 1].transpose();
            }
            dh = self.w_h.transpose() * &dpre;
        }

        (grads, 0.5 * dy * dy)
    }

    fn apply(&mut self, mut grads: Grads, learning_rate: f64) {
        let norm = grads.norm();
        if norm > GRAD_CLIP_NORM {
            grads.scale_mut(GRAD_CLIP_NORM / norm);
        }

        self.w_in -= grads.w_in.scale(learning_rate);
        self.w_h -= grads.w_h.scale(learning_rate);
        self.b_h -= grads.b_h.scale(learning_rate);
        self.w_out -= grads.w_out.scale(learning_rate);
        self.b_out -= grads.b_out * learning_rate;
    }

    /// Plain SGD over the supervised windows. Returns the mean loss of
    /// the final epoch.
    pub fn fit(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[f64],
        epochs: usize,
        learning_rate: f64,
    ) -> f64 {
        assert_eq!(inputs.len(), targets.len());
        if inputs.is_empty() {
            return 0.0;
        }

        let mut epoch_loss = 0.0;
        for epoch in 0..epochs {
            epoch_loss = 0.0;
            for (window, &target) in inputs.iter().zip(targets.iter()) {
                let (grads, loss) = self.backward(window, target);
                self.apply(grads, learning_rate);
                epoch_loss += loss;
            }
            epoch_loss /= inputs.len() as f64;

            if epoch % 10 == 0 {
                tracing::debug!("Training epoch {}: mean loss {:.6}", epoch, epoch_loss);
            }
        }

        epoch_loss
    }

    /// Mean squared-error loss over a held-out set.
    pub fn evaluate(&self, inputs: &[Vec<f64>], targets: &[f64]) -> f64 {
        if inputs.is_empty() {
            return 0.0;
        }
        let total: f64 = inputs
            .iter()
            .zip(targets.iter())
            .map(|(window, &target)| {
                let err = self.predict(window) - target;
                0.5 * err * err
            })
            .sum();
        total / inputs.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_samples(value: f64, window: usize, count: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let inputs = vec![vec![value; window]; count];
        let targets = vec![value; count];
        (inputs, targets)
    }

    #[test]
    fn seeded_init_is_reproducible() {
        let a = RecurrentNet::new(8, 7);
        let b = RecurrentNet::new(8, 7);
        assert_eq!(a.w_in, b.w_in);
        assert_eq!(a.w_h, b.w_h);
        assert_eq!(a.w_out, b.w_out);
    }

    #[test]
    fn training_reduces_loss_on_constant_sequence() {
        let (inputs, targets) = constant_samples(0.5, 10, 20);
        let mut net = RecurrentNet::new(8, 1);

        let before = net.evaluate(&inputs, &targets);
        let after = net.fit(&inputs, &targets, 50, 0.05);

        assert!(after < before);
        assert!((net.predict(&inputs[0]) - 0.5).abs() < 0.2);
    }

    #[test]
    fn gradient_clip_keeps_updates_finite() {
        let inputs = vec![vec![1.0; 30]; 5];
        let targets = vec![100.0; 5]; // absurd target to provoke large grads
        let mut net = RecurrentNet::new(8, 3);

        net.fit(&inputs, &targets, 5, 0.1);

        assert!(net.predict(&inputs[0]).is_finite());
    }

    #[test]
    fn predict_is_deterministic() {
        let net = RecurrentNet::new(8, 11);
        let window: Vec<f64> = (0..20).map(|i| i as f64 / 20.0).collect();
        assert_eq!(net.predict(&window), net.predict(&window));
    }
}
