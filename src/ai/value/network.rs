use std::error::Error;
use std::path::Path;

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::DefaultRecorder;

use super::approx::{ApproxConfig, Approximator};
use crate::ai::networks::{QNetwork, QNetworkConfig};
use crate::ai::state_encoding::encode_state;

type InferBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferBackend>;

const WEIGHTS_FILE: &str = "q_network";

/// [`QNetwork`] trained with Adam on a squared-error loss, one sample per step.
pub struct NetworkApproximator {
    model: QNetwork<TrainBackend>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, QNetwork<TrainBackend>, TrainBackend>,
    net_config: QNetworkConfig,
    learning_rate: f64,
    device: <TrainBackend as Backend>::Device,
}

impl NetworkApproximator {
    pub fn new(config: &ApproxConfig, num_actions: usize) -> Self {
        let device = Default::default();
        let net_config = QNetworkConfig::new(config.state_size, num_actions)
            .with_hidden_size(config.hidden_size);
        NetworkApproximator {
            model: net_config.init(&device),
            optimizer: AdamConfig::new().init(),
            net_config,
            learning_rate: config.learning_rate,
            device,
        }
    }
}

impl Approximator for NetworkApproximator {
    fn input_size(&self) -> usize {
        self.net_config.input_size
    }

    fn num_actions(&self) -> usize {
        self.net_config.num_actions
    }

    fn predict(&self, state: &[f32]) -> Vec<f32> {
        let input = encode_state::<InferBackend>(state, &self.device);
        self.model
            .valid()
            .forward(input)
            .into_data()
            .to_vec()
            .expect("f32 tensor data extraction")
    }

    fn fit(&mut self, state: &[f32], target: &[f32]) -> f32 {
        let input = encode_state::<TrainBackend>(state, &self.device);
        let target = encode_state::<TrainBackend>(target, &self.device);

        let diff = self.model.forward(input) - target;
        let loss = (diff.clone() * diff).mean();
        let loss_val: f32 = loss.clone().into_scalar();

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self
            .optimizer
            .step(self.learning_rate, self.model.clone(), grads);

        loss_val
    }

    fn save_to_dir(&self, dir: &Path) -> Result<(), Box<dyn Error>> {
        let recorder = DefaultRecorder::default();
        self.model
            .valid()
            .save_file(dir.join(WEIGHTS_FILE), &recorder)?;
        Ok(())
    }

    fn load_from_dir(&mut self, dir: &Path) -> Result<(), Box<dyn Error>> {
        let recorder = DefaultRecorder::default();
        let model: QNetwork<TrainBackend> = self.net_config.init(&self.device).load_file(
            dir.join(WEIGHTS_FILE),
            &recorder,
            &self.device,
        )?;
        self.model = model;
        Ok(())
    }
}
