//! Data item descriptors
//!
//! A [`DataItem`] describes one measured signal on a device: its category,
//! representation, units and the filter thresholds the pipeline applies to
//! it. Data items are created when the device model is loaded and are
//! immutable while the pipeline runs.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::entity::names;
use crate::error::{PipelineError, PipelineResult};

/// Observation category of a data item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Sample,
    Event,
    Condition,
}

impl Category {
    /// Parses the attribute-map spelling (`"SAMPLE"`, `"EVENT"`, `"CONDITION"`)
    pub fn parse(input: &str) -> PipelineResult<Self> {
        match input {
            "SAMPLE" => Ok(Category::Sample),
            "EVENT" => Ok(Category::Event),
            "CONDITION" => Ok(Category::Condition),
            other => Err(PipelineError::InvalidConfiguration {
                message: format!("unknown data item category: {}", other),
            }),
        }
    }
}

/// Value representation of a data item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Representation {
    #[default]
    Value,
    TimeSeries,
    DataSet,
    Table,
}

impl Representation {
    /// Parses the attribute-map spelling (`"VALUE"`, `"TIME_SERIES"`, ...)
    pub fn parse(input: &str) -> PipelineResult<Self> {
        match input {
            "VALUE" => Ok(Representation::Value),
            "TIME_SERIES" => Ok(Representation::TimeSeries),
            "DATA_SET" => Ok(Representation::DataSet),
            "TABLE" => Ok(Representation::Table),
            other => Err(PipelineError::InvalidConfiguration {
                message: format!("unknown data item representation: {}", other),
            }),
        }
    }
}

/// Read-only descriptor of one measured signal
///
/// # Example
///
/// ```rust,ignore
/// let position = DataItem::from_attributes([
///     ("id", "x1"),
///     ("type", "POSITION"),
///     ("category", "SAMPLE"),
///     ("units", "MILLIMETER"),
///     ("minimumDelta", "0.5"),
/// ])?;
/// assert!(position.minimum_delta().is_some());
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataItem {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    device: Option<String>,
    category: Category,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    sub_type: Option<String>,
    #[serde(default)]
    representation: Representation,
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    native_units: Option<String>,
    /// Minimum absolute change a numeric sample must exceed to forward
    #[serde(default)]
    minimum_delta: Option<f64>,
    /// Minimum interval between forwarded observations, in seconds
    #[serde(default)]
    filter_period: Option<f64>,
    #[serde(default)]
    controlled_vocabulary: Option<HashSet<String>>,
}

impl DataItem {
    /// Builds a data item from a flat attribute map
    ///
    /// This is the shape device-model parsers and test fixtures hand over:
    /// string keys and values, with `id`, `type` and `category` required.
    pub fn from_attributes<'a, I>(attributes: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let map: HashMap<&str, &str> = attributes.into_iter().collect();

        let required = |key: &str| -> PipelineResult<&str> {
            map.get(key)
                .copied()
                .ok_or_else(|| PipelineError::InvalidConfiguration {
                    message: format!("data item is missing required attribute '{}'", key),
                })
        };

        let parse_f64 = |key: &str, raw: &str| -> PipelineResult<f64> {
            raw.parse::<f64>()
                .map_err(|_| PipelineError::InvalidConfiguration {
                    message: format!("attribute '{}' is not a number: {}", key, raw),
                })
        };

        let id = required("id")?.to_string();
        let category = Category::parse(required("category")?)?;
        let data_type = required("type")?.to_string();

        let representation = match map.get("representation") {
            Some(raw) => Representation::parse(raw)?,
            None => Representation::Value,
        };

        let minimum_delta = map
            .get("minimumDelta")
            .map(|raw| parse_f64("minimumDelta", raw))
            .transpose()?;
        let filter_period = map
            .get("filterPeriod")
            .map(|raw| parse_f64("filterPeriod", raw))
            .transpose()?;

        for (key, value) in [("minimumDelta", minimum_delta), ("filterPeriod", filter_period)] {
            if let Some(v) = value {
                if v < 0.0 {
                    return Err(PipelineError::InvalidConfiguration {
                        message: format!("attribute '{}' must be >= 0, got {}", key, v),
                    });
                }
            }
        }

        Ok(Self {
            id,
            name: map.get("name").map(|s| s.to_string()),
            device: map.get("device").map(|s| s.to_string()),
            category,
            data_type,
            sub_type: map.get("subType").map(|s| s.to_string()),
            representation,
            units: map.get("units").map(|s| s.to_string()),
            native_units: map.get("nativeUnits").map(|s| s.to_string()),
            minimum_delta,
            filter_period,
            controlled_vocabulary: None,
        })
    }

    /// Restricts acceptable string values to the given vocabulary
    pub fn with_vocabulary<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.controlled_vocabulary = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.sub_type.as_deref()
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    pub fn units(&self) -> Option<&str> {
        self.units.as_deref()
    }

    pub fn native_units(&self) -> Option<&str> {
        self.native_units.as_deref()
    }

    /// Minimum-delta threshold, when one is configured and positive
    pub fn minimum_delta(&self) -> Option<f64> {
        self.minimum_delta.filter(|d| *d > 0.0)
    }

    /// Filter period as a duration, when one is configured and positive
    pub fn filter_period(&self) -> Option<chrono::Duration> {
        self.filter_period
            .filter(|p| *p > 0.0)
            .map(|seconds| chrono::Duration::nanoseconds((seconds * 1e9) as i64))
    }

    pub fn controlled_vocabulary(&self) -> Option<&HashSet<String>> {
        self.controlled_vocabulary.as_ref()
    }

    /// Checks a string value against the controlled vocabulary
    ///
    /// Values are always acceptable when no vocabulary is configured.
    /// Matching is case-sensitive.
    pub fn accepts_value(&self, value: &str) -> bool {
        match &self.controlled_vocabulary {
            Some(vocabulary) => vocabulary.contains(value),
            None => true,
        }
    }

    /// Entity name of observations produced for this data item
    ///
    /// The representation decides the variant for non-scalar shapes; scalar
    /// observations take their category's name.
    pub fn observation_name(&self) -> &'static str {
        match self.representation {
            Representation::TimeSeries => names::TIME_SERIES,
            Representation::DataSet => names::DATA_SET,
            Representation::Table => names::TABLE,
            Representation::Value => match self.category {
                Category::Sample => names::SAMPLE,
                Category::Event => names::EVENT,
                Category::Condition => names::CONDITION,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_attributes_minimal() {
        let di = DataItem::from_attributes([
            ("id", "a"),
            ("type", "EXECUTION"),
            ("category", "EVENT"),
        ])
        .unwrap();
        assert_eq!(di.id(), "a");
        assert_eq!(di.category(), Category::Event);
        assert_eq!(di.representation(), Representation::Value);
        assert_eq!(di.observation_name(), names::EVENT);
        assert!(di.minimum_delta().is_none());
    }

    #[test]
    fn test_from_attributes_sample_with_filters() {
        let di = DataItem::from_attributes([
            ("id", "x1"),
            ("type", "POSITION"),
            ("category", "SAMPLE"),
            ("units", "MILLIMETER"),
            ("minimumDelta", "0.5"),
            ("filterPeriod", "10"),
        ])
        .unwrap();
        assert_eq!(di.units(), Some("MILLIMETER"));
        assert_eq!(di.minimum_delta(), Some(0.5));
        assert_eq!(di.filter_period(), Some(chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_missing_required_attribute() {
        let err = DataItem::from_attributes([("id", "a"), ("type", "POSITION")]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let err = DataItem::from_attributes([
            ("id", "a"),
            ("type", "POSITION"),
            ("category", "SAMPLE"),
            ("minimumDelta", "-1"),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_zero_threshold_means_unfiltered() {
        let di = DataItem::from_attributes([
            ("id", "a"),
            ("type", "POSITION"),
            ("category", "SAMPLE"),
            ("minimumDelta", "0"),
        ])
        .unwrap();
        assert_eq!(di.minimum_delta(), None);
    }

    #[test]
    fn test_representation_drives_observation_name() {
        let di = DataItem::from_attributes([
            ("id", "d"),
            ("type", "VARIABLE"),
            ("category", "EVENT"),
            ("representation", "DATA_SET"),
        ])
        .unwrap();
        assert_eq!(di.observation_name(), names::DATA_SET);
    }

    #[test]
    fn test_controlled_vocabulary_case_sensitive() {
        let di = DataItem::from_attributes([
            ("id", "e"),
            ("type", "EXECUTION"),
            ("category", "EVENT"),
        ])
        .unwrap()
        .with_vocabulary(["READY", "ACTIVE", "STOPPED"]);

        assert!(di.accepts_value("READY"));
        assert!(!di.accepts_value("ready"));
        assert!(!di.accepts_value("PAUSED"));
    }

    #[test]
    fn test_deserialize_from_json() {
        let di: DataItem = serde_json::from_str(
            r#"{
                "id": "spd",
                "type": "ROTARY_VELOCITY",
                "category": "SAMPLE",
                "representation": "VALUE",
                "units": "REVOLUTION/MINUTE",
                "minimumDelta": 2.5
            }"#,
        )
        .unwrap();
        assert_eq!(di.id(), "spd");
        assert_eq!(di.minimum_delta(), Some(2.5));
    }
}
