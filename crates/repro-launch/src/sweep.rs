use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LaunchError, Result};

/// A named input of a sweepable program. Only `Swept` parameters take part
/// in the cartesian product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Parameter {
    Fixed {
        name: String,
        #[serde(default)]
        value: Option<String>,
    },
    Swept {
        name: String,
        values: Vec<String>,
    },
}

impl Parameter {
    pub fn fixed(name: impl Into<String>) -> Self {
        Parameter::Fixed {
            name: name.into(),
            value: None,
        }
    }

    /// Fixed parameter with a known value, e.g. an argument default.
    pub fn fixed_with(name: impl Into<String>, value: impl Into<String>) -> Self {
        Parameter::Fixed {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    pub fn swept<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Parameter::Swept {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Parameter::Fixed { name, .. } | Parameter::Swept { name, .. } => name,
        }
    }

    pub fn is_swept(&self) -> bool {
        matches!(self, Parameter::Swept { .. })
    }
}

/// One value for every swept parameter, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub assignments: Vec<(String, String)>,
}

impl Configuration {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.assignments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPlan {
    /// Names of the swept parameters, in declaration order.
    pub axes: Vec<String>,
    pub configurations: Vec<Configuration>,
}

impl SweepPlan {
    pub fn len(&self) -> usize {
        self.configurations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configurations.is_empty()
    }

    /// Number of array tasks to submit. A plan without swept parameters still
    /// runs once; a swept parameter with no values leaves nothing to run.
    pub fn array_len(&self) -> usize {
        if self.axes.is_empty() {
            1
        } else {
            self.len()
        }
    }

    /// Configuration owned by array task `index`. Without swept parameters,
    /// index 0 owns the empty configuration.
    pub fn select(&self, index: usize) -> Result<Configuration> {
        if self.axes.is_empty() && index == 0 {
            return Ok(Configuration::default());
        }
        self.configurations
            .get(index)
            .cloned()
            .ok_or(LaunchError::IndexOutOfRange {
                index,
                len: self.array_len(),
            })
    }

    /// `sha256:<hex>` of the canonical JSON form.
    pub fn digest(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        format!("sha256:{}", hex::encode(Sha256::digest(&bytes)))
    }
}

/// Cartesian product of the swept parameters' values. The first declared
/// parameter is the outermost loop, so the last one varies fastest.
pub fn enumerate(parameters: &[Parameter]) -> SweepPlan {
    let axes: Vec<(&str, &[String])> = parameters
        .iter()
        .filter_map(|p| match p {
            Parameter::Swept { name, values } => Some((name.as_str(), values.as_slice())),
            Parameter::Fixed { .. } => None,
        })
        .collect();
    if axes.is_empty() {
        return SweepPlan::default();
    }

    let total: usize = axes.iter().map(|(_, values)| values.len()).product();
    let mut configurations = Vec::with_capacity(total);
    let mut cursor = vec![0usize; axes.len()];
    for _ in 0..total {
        configurations.push(Configuration {
            assignments: axes
                .iter()
                .zip(&cursor)
                .map(|((name, values), &i)| (name.to_string(), values[i].clone()))
                .collect(),
        });
        for axis in (0..axes.len()).rev() {
            cursor[axis] += 1;
            if cursor[axis] < axes[axis].1.len() {
                break;
            }
            cursor[axis] = 0;
        }
    }
    SweepPlan {
        axes: axes.iter().map(|(name, _)| name.to_string()).collect(),
        configurations,
    }
}
