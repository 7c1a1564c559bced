use crate::errors::PosecapError;
use crate::sample::Sample;
use std::collections::BTreeSet;

/// Post-recording filter applied before export. Neither step reorders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub targets: Option<BTreeSet<String>>,
    pub stride: usize,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            targets: None,
            stride: 1,
        }
    }
}

impl Selection {
    pub fn apply(&self, samples: &[Sample]) -> Result<Vec<Sample>, PosecapError> {
        let filtered = match &self.targets {
            Some(targets) => filter_targets(samples, targets),
            None => samples.to_vec(),
        };
        downsample(&filtered, self.stride)
    }
}

pub fn filter_targets(samples: &[Sample], targets: &BTreeSet<String>) -> Vec<Sample> {
    samples
        .iter()
        .filter(|sample| targets.contains(&sample.target_id))
        .cloned()
        .collect()
}

/// Keeps indices `0, stride, 2 * stride, ...`.
pub fn downsample(samples: &[Sample], stride: usize) -> Result<Vec<Sample>, PosecapError> {
    if stride == 0 {
        return Err(PosecapError::InvalidConfig(
            "stride must be greater than zero".to_string(),
        ));
    }
    Ok(samples.iter().step_by(stride).cloned().collect())
}
