//! Value conditions a source must pass to be eligible
//!
//! A condition is either a numeric `range` or a `regex` the whole value has
//! to match. Conditions with an `index` apply to that source only, the
//! others apply to every source. A source is valid when every condition
//! that applies to it passes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{FallbackConfigError, FallbackConfigResult};

/// A condition as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionConfig {
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        index: Option<usize>,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        index: Option<usize>,
    },
}

impl ConditionConfig {
    /// Source position this condition is limited to, if any
    pub fn index(&self) -> Option<usize> {
        match self {
            ConditionConfig::Range { index, .. } | ConditionConfig::Regex { index, .. } => *index,
        }
    }
}

/// A validated condition
#[derive(Debug, Clone)]
pub enum Condition {
    /// Inclusive numeric bounds, at least one present
    Range { min: Option<f64>, max: Option<f64> },
    /// Anchored so it only passes on a full match
    Regex(Regex),
}

impl Condition {
    /// Check a state value against this condition
    pub fn check(&self, value: &str) -> bool {
        match self {
            Condition::Range { min, max } => {
                let Ok(number) = value.trim().parse::<f64>() else {
                    trace!(value, "Value is not numeric");
                    return false;
                };
                if number.is_nan() {
                    return false;
                }
                if min.is_some_and(|min| number < min) {
                    trace!(value, ?min, "Value below minimum");
                    return false;
                }
                if max.is_some_and(|max| number > max) {
                    trace!(value, ?max, "Value above maximum");
                    return false;
                }
                true
            }
            Condition::Regex(regex) => {
                let matches = regex.is_match(value);
                if !matches {
                    trace!(value, pattern = regex.as_str(), "Value does not match pattern");
                }
                matches
            }
        }
    }
}

/// A condition together with the source it is limited to
#[derive(Debug, Clone)]
pub struct ScopedCondition {
    pub index: Option<usize>,
    pub condition: Condition,
}

impl ScopedCondition {
    fn applies_to(&self, index: usize) -> bool {
        self.index.map_or(true, |i| i == index)
    }
}

/// All conditions of one fallback sensor
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    conditions: Vec<ScopedCondition>,
}

impl ConditionSet {
    /// Validate and compile configured conditions for `source_count` sources
    pub fn compile(configs: &[ConditionConfig], source_count: usize) -> FallbackConfigResult<Self> {
        let conditions = configs
            .iter()
            .enumerate()
            .map(|(position, config)| compile_one(position, config, source_count))
            .collect::<FallbackConfigResult<Vec<_>>>()?;

        Ok(Self { conditions })
    }

    /// Check whether the value of the source at `index` passes every
    /// condition that applies to it
    pub fn is_valid(&self, index: usize, value: &str) -> bool {
        self.conditions
            .iter()
            .filter(|c| c.applies_to(index))
            .all(|c| c.condition.check(value))
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

fn compile_one(
    position: usize,
    config: &ConditionConfig,
    source_count: usize,
) -> FallbackConfigResult<ScopedCondition> {
    let index = config.index();
    if let Some(index) = index {
        if index >= source_count {
            return Err(FallbackConfigError::ConditionIndexOutOfRange {
                condition: position,
                index,
                sources: source_count,
            });
        }
    }

    let condition = match config {
        ConditionConfig::Range { min, max, .. } => {
            match (min, max) {
                (None, None) => {
                    return Err(FallbackConfigError::EmptyRange {
                        condition: position,
                    })
                }
                (Some(min), Some(max)) if min > max => {
                    return Err(FallbackConfigError::InvertedRange {
                        condition: position,
                        min: *min,
                        max: *max,
                    })
                }
                _ => {}
            }
            Condition::Range {
                min: *min,
                max: *max,
            }
        }
        ConditionConfig::Regex { pattern, .. } => {
            let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                FallbackConfigError::InvalidRegex {
                    condition: position,
                    pattern: pattern.clone(),
                    source,
                }
            })?;
            Condition::Regex(regex)
        }
    };

    Ok(ScopedCondition { index, condition })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: Option<f64>, max: Option<f64>) -> ConditionConfig {
        ConditionConfig::Range {
            min,
            max,
            index: None,
        }
    }

    fn regex(pattern: &str) -> ConditionConfig {
        ConditionConfig::Regex {
            pattern: pattern.to_string(),
            index: None,
        }
    }

    fn compile(configs: &[ConditionConfig]) -> ConditionSet {
        ConditionSet::compile(configs, 3).unwrap()
    }

    #[test]
    fn test_no_conditions_always_valid() {
        let set = compile(&[]);
        assert!(set.is_empty());
        assert!(set.is_valid(0, "any_value"));
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let set = compile(&[range(Some(10.0), Some(30.0))]);
        assert!(set.is_valid(0, "20"));
        assert!(set.is_valid(0, "10"));
        assert!(set.is_valid(0, "30"));
        assert!(!set.is_valid(0, "5"));
        assert!(!set.is_valid(0, "35"));
    }

    #[test]
    fn test_range_single_bound() {
        let min_only = compile(&[range(Some(10.0), None)]);
        assert!(min_only.is_valid(0, "15"));
        assert!(!min_only.is_valid(0, "5"));

        let max_only = compile(&[range(None, Some(30.0))]);
        assert!(max_only.is_valid(0, "25"));
        assert!(!max_only.is_valid(0, "35"));
    }

    #[test]
    fn test_range_non_numeric() {
        let set = compile(&[range(Some(10.0), Some(30.0))]);
        assert!(!set.is_valid(0, "not_a_number"));
        assert!(!set.is_valid(0, "NaN"));
        assert!(!set.is_valid(0, ""));
        assert!(set.is_valid(0, " 21.5 "));
    }

    #[test]
    fn test_regex_full_match() {
        let set = compile(&[regex(r"on|off")]);
        assert!(set.is_valid(0, "on"));
        assert!(set.is_valid(0, "off"));
        assert!(!set.is_valid(0, "invalid"));
        assert!(!set.is_valid(0, "online"));
    }

    #[test]
    fn test_regex_already_anchored() {
        let set = compile(&[regex(r"^\d+\.\d{2}$")]);
        assert!(set.is_valid(0, "12.34"));
        assert!(!set.is_valid(0, "12.3"));
    }

    #[test]
    fn test_multiple_conditions_all_must_pass() {
        let set = compile(&[range(Some(10.0), Some(30.0)), regex(r"\d+")]);
        assert!(set.is_valid(0, "20"));
        // Outside the range, matches the pattern
        assert!(!set.is_valid(0, "5"));
        // Inside the range, fails the pattern
        assert!(!set.is_valid(0, "20.5"));
    }

    #[test]
    fn test_indexed_condition_applies_to_one_source() {
        let set = compile(&[ConditionConfig::Range {
            min: Some(15.0),
            max: Some(30.0),
            index: Some(1),
        }]);
        assert!(set.is_valid(0, "100"));
        assert!(!set.is_valid(1, "100"));
        assert!(set.is_valid(1, "21.5"));
        assert!(set.is_valid(2, "100"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let result = ConditionSet::compile(&[regex(r"[invalid(regex")], 2);
        assert!(matches!(
            result,
            Err(FallbackConfigError::InvalidRegex { condition: 0, .. })
        ));
    }

    #[test]
    fn test_malformed_ranges_rejected() {
        assert!(matches!(
            ConditionSet::compile(&[range(None, None)], 2),
            Err(FallbackConfigError::EmptyRange { condition: 0 })
        ));
        assert!(matches!(
            ConditionSet::compile(&[regex("x"), range(Some(30.0), Some(10.0))], 2),
            Err(FallbackConfigError::InvertedRange { condition: 1, .. })
        ));
    }

    #[test]
    fn test_index_out_of_range_rejected() {
        let result = ConditionSet::compile(
            &[ConditionConfig::Regex {
                pattern: "x".to_string(),
                index: Some(2),
            }],
            2,
        );
        assert!(matches!(
            result,
            Err(FallbackConfigError::ConditionIndexOutOfRange {
                index: 2,
                sources: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_deserialize_conditions() {
        let yaml = r#"
- type: range
  min: 15
  max: 30
  index: 1
- type: regex
  pattern: "on|off"
"#;
        let configs: Vec<ConditionConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(configs[0], range_at(Some(15.0), Some(30.0), 1));
        assert_eq!(configs[1].index(), None);

        let unknown: Result<Vec<ConditionConfig>, _> =
            serde_yaml::from_str("- type: unknown_type\n");
        assert!(unknown.is_err());
    }

    fn range_at(min: Option<f64>, max: Option<f64>, index: usize) -> ConditionConfig {
        ConditionConfig::Range {
            min,
            max,
            index: Some(index),
        }
    }
}
