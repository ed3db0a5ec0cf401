//! Build matrix expansion

use serde::{Deserialize, Serialize};

/// A build matrix: named axes, each with a list of values.
///
/// Axes are kept sorted by name so expansion order is deterministic
/// regardless of YAML map ordering.
#[derive(Debug, Clone, Default)]
pub struct Matrix {
    axes: Vec<(String, Vec<String>)>,
}

/// One combination of axis values, in axis order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCombination {
    pub values: Vec<(String, String)>,
}

impl MatrixCombination {
    /// Value for a single axis
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Human-readable label like `os=linux, python=3.9`
    pub fn label(&self) -> String {
        self.values
            .iter()
            .map(|(axis, value)| format!("{}={}", axis, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Matrix {
    pub fn new(mut axes: Vec<(String, Vec<String>)>) -> Self {
        axes.sort_by(|a, b| a.0.cmp(&b.0));
        Self { axes }
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn axes(&self) -> &[(String, Vec<String>)] {
        &self.axes
    }

    /// Number of combinations expand() will produce
    pub fn instance_count(&self) -> usize {
        self.axes.iter().map(|(_, values)| values.len()).product()
    }

    /// Cartesian product of all axis values.
    ///
    /// An empty matrix expands to a single empty combination, so a job
    /// without a matrix still yields exactly one instance.
    pub fn expand(&self) -> Vec<MatrixCombination> {
        let mut combinations = vec![MatrixCombination::default()];
        for (axis, values) in &self.axes {
            let mut next = Vec::with_capacity(combinations.len() * values.len());
            for combination in &combinations {
                for value in values {
                    let mut expanded = combination.clone();
                    expanded.values.push((axis.clone(), value.clone()));
                    next.push(expanded);
                }
            }
            combinations = next;
        }
        combinations
    }
}
