//! Training infrastructure: the multi-agent control loop, run driver with
//! checkpointing, replay buffer, metrics collection, and dashboard message
//! types for live TUI updates.

pub mod control_loop;
pub mod dashboard_msg;
pub mod metrics;
pub mod replay_buffer;
pub mod trainer;
