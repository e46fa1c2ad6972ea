use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

/// Small MLP mapping a lane-feature vector to per-action values.
///
/// ```text
/// Input:  [batch, input_size]
/// FC1:    input_size -> hidden, ReLU
/// FC2:    hidden -> hidden, ReLU
/// Out:    hidden -> num_actions (linear)
/// ```
#[derive(Module, Debug)]
pub struct QNetwork<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
    relu: Relu,
}

#[derive(Config, Debug)]
pub struct QNetworkConfig {
    pub input_size: usize,
    pub num_actions: usize,
    #[config(default = 24)]
    pub hidden_size: usize,
}

impl QNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> QNetwork<B> {
        QNetwork {
            fc1: LinearConfig::new(self.input_size, self.hidden_size).init(device),
            fc2: LinearConfig::new(self.hidden_size, self.hidden_size).init(device),
            out: LinearConfig::new(self.hidden_size, self.num_actions).init(device),
            relu: Relu::new(),
        }
    }
}

impl<B: Backend> QNetwork<B> {
    /// Forward pass: input [batch, input_size] -> output [batch, num_actions].
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.relu.forward(self.fc1.forward(input));
        let x = self.relu.forward(self.fc2.forward(x));
        self.out.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_network_output_shape() {
        let device = Default::default();
        let network = QNetworkConfig::new(4, 2).init::<TestBackend>(&device);

        let input = Tensor::zeros([3, 4], &device);
        let output = network.forward(input);
        assert_eq!(output.shape().dims, [3, 2]);
    }

    #[test]
    fn test_hidden_size_override() {
        let device = Default::default();
        let config = QNetworkConfig::new(8, 5).with_hidden_size(16);
        assert_eq!(config.hidden_size, 16);
        let network = config.init::<TestBackend>(&device);

        let output = network.forward(Tensor::zeros([1, 8], &device));
        assert_eq!(output.shape().dims, [1, 5]);
    }
}
