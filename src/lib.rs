//! # Signal RL
//!
//! Reinforcement-learning control of traffic signals. Each signalized
//! intersection is an agent that observes lane congestion, picks a phase
//! action epsilon-greedily from a learned value function, and learns from
//! the negated congestion that follows. Ships a tabular Q-learner and a
//! replay-trained neural approximator built on the Burn ML framework, plus
//! a Ratatui dashboard for watching runs live.
//!
//! ## Modules
//!
//! - [`sim`] — Simulator boundary, phase strings, synthetic network
//! - [`ai`] — Observation, state encoding, reward, value functions, policy
//! - [`training`] — Control loop, run driver, replay buffer, metrics
//! - [`checkpoint`] — Value function persistence and versioning
//! - [`ui`] — Terminal UI: training dashboard
//! - [`config`] — TOML configuration loading and validation
//! - [`error`] — Structured error types

#![recursion_limit = "256"]

pub mod ai;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod sim;
pub mod training;
pub mod ui;
