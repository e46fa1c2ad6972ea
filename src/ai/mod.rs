pub mod actions;
pub mod networks;
pub mod observation;
pub mod policy;
pub mod reward;
pub mod state_encoding;
pub mod transition;
pub mod value;

pub use actions::{ActionSet, SignalAction};
pub use observation::{AgentObservation, CongestionMetric, LaneObservation, Observer};
pub use policy::{EpsilonGreedy, PolicyConfig};
pub use reward::congestion_reward;
pub use state_encoding::{FeatureSource, StateEncoder, TabularEncoder, VectorEncoder};
pub use transition::{Transition, UpdateMetrics};
pub use value::{
    ApproxConfig, ApproximateQ, Approximator, NetworkApproximator, TabularConfig, TabularQ,
    ValueFunction, ValueSnapshot,
};
