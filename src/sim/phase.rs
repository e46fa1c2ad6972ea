use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SimulatorError;

/// Signal state of one intersection: one character per controlled signal
/// head, `r` red, `y` yellow, `g` green, `G` priority green.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseString(String);

impl PhaseString {
    pub fn parse(s: &str) -> Result<Self, SimulatorError> {
        if s.is_empty() || !s.chars().all(|c| matches!(c, 'r' | 'y' | 'g' | 'G')) {
            return Err(SimulatorError::InvalidPhase(s.to_string()));
        }
        Ok(PhaseString(s.to_string()))
    }

    /// `g` on even heads, `r` on odd heads. Zero heads gives a lone `r`.
    pub(crate) fn alternating(heads: usize) -> PhaseString {
        if heads == 0 {
            return PhaseString("r".to_string());
        }
        PhaseString(
            (0..heads)
                .map(|i| if i % 2 == 0 { 'g' } else { 'r' })
                .collect(),
        )
    }

    /// Swap red and green heads. Yellow and priority-green heads are kept.
    pub fn toggle(&self) -> PhaseString {
        let toggled = self
            .0
            .chars()
            .map(|c| match c {
                'r' => 'g',
                'g' => 'r',
                other => other,
            })
            .collect();
        PhaseString(toggled)
    }

    /// Whether the head at `index` currently lets traffic through.
    pub fn is_green(&self, index: usize) -> bool {
        matches!(self.0.as_bytes().get(index), Some(b'g') | Some(b'G'))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PhaseString {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseString::parse(s)
    }
}

impl fmt::Display for PhaseString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
