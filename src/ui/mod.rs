//! Terminal dashboard: live congestion and reward charts, action counts,
//! per-agent rows and the selected agent's value rows.

pub mod training_dashboard;
pub mod training_view;
