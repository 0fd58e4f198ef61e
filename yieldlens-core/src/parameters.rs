//! Process parameter catalogue and the analyst's hypothetical inputs.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a parameter is entered on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Text,
    Number,
    Select,
}

/// One process parameter the analyst can set for a what-if prediction.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessParameter {
    pub id: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    #[serde(skip_serializing_if = "no_options")]
    pub options: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
}

fn no_options(options: &&'static [&'static str]) -> bool {
    options.is_empty()
}

/// The fixed parameter catalogue, in display and prompt order.
pub const PREDICTION_PARAMETERS: &[ProcessParameter] = &[
    ProcessParameter {
        id: "materialSupplier",
        label: "Material Supplier",
        kind: ParameterKind::Text,
        options: &[],
        unit: None,
    },
    ProcessParameter {
        id: "temperature",
        label: "Temperature",
        kind: ParameterKind::Number,
        options: &[],
        unit: Some("°C"),
    },
    ProcessParameter {
        id: "machineSpeed",
        label: "Machine Speed",
        kind: ParameterKind::Number,
        options: &[],
        unit: Some("units/min"),
    },
    ProcessParameter {
        id: "shift",
        label: "Shift",
        kind: ParameterKind::Select,
        options: &["Day", "Night"],
        unit: None,
    },
    ProcessParameter {
        id: "humidity",
        label: "Humidity",
        kind: ParameterKind::Number,
        options: &[],
        unit: Some("%"),
    },
];

/// Look up a catalogue entry by id.
pub fn find_parameter(id: &str) -> Option<&'static ProcessParameter> {
    PREDICTION_PARAMETERS.iter().find(|p| p.id == id)
}

/// A user-supplied scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Number(f64),
    Text(String),
}

impl InputValue {
    pub fn is_blank(&self) -> bool {
        match self {
            InputValue::Number(n) => !n.is_finite(),
            InputValue::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Number(n) => write!(f, "{}", n),
            InputValue::Text(s) => f.write_str(s.trim()),
        }
    }
}

impl From<&str> for InputValue {
    fn from(s: &str) -> Self {
        InputValue::Text(s.to_string())
    }
}

impl From<f64> for InputValue {
    fn from(n: f64) -> Self {
        InputValue::Number(n)
    }
}

/// What-if values keyed by parameter id.
///
/// Created empty, edited field by field, never cleared automatically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HypotheticalInputs(BTreeMap<String, InputValue>);

impl HypotheticalInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one field. A blank value removes the field.
    pub fn set(&mut self, field: &str, value: InputValue) -> Result<(), ValidationError> {
        let param = find_parameter(field).ok_or_else(|| ValidationError::UnknownParameter {
            field: field.to_string(),
        })?;

        if value.is_blank() {
            self.0.remove(field);
            return Ok(());
        }

        if param.kind == ParameterKind::Select {
            let text = value.to_string();
            if !param.options.iter().any(|o| *o == text) {
                return Err(ValidationError::InvalidOption {
                    field: field.to_string(),
                    value: text,
                    allowed: param.options.join(", "),
                });
            }
        }

        self.0.insert(field.to_string(), value);
        Ok(())
    }

    pub fn get(&self, field: &str) -> Option<&InputValue> {
        self.0.get(field)
    }

    /// Whether at least one field carries a non-blank value.
    pub fn has_any(&self) -> bool {
        self.0.values().any(|v| !v.is_blank())
    }

    /// Non-blank entries in catalogue order.
    pub fn filled(&self) -> impl Iterator<Item = (&'static str, &InputValue)> + '_ {
        PREDICTION_PARAMETERS.iter().filter_map(|p| {
            self.0
                .get(p.id)
                .filter(|v| !v.is_blank())
                .map(|v| (p.id, v))
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_ids_unique() {
        let mut ids: Vec<_> = PREDICTION_PARAMETERS.iter().map(|p| p.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), PREDICTION_PARAMETERS.len());
    }

    #[test]
    fn test_set_and_get() {
        let mut inputs = HypotheticalInputs::new();
        inputs.set("temperature", InputValue::Number(21.5)).unwrap();
        assert_eq!(inputs.get("temperature"), Some(&InputValue::Number(21.5)));
        assert!(inputs.has_any());
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let mut inputs = HypotheticalInputs::new();
        let err = inputs.set("pressure", "2 bar".into()).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownParameter {
                field: "pressure".into()
            }
        );
        assert!(inputs.is_empty());
    }

    #[test]
    fn test_select_option_enforced() {
        let mut inputs = HypotheticalInputs::new();
        assert!(inputs.set("shift", "Night".into()).is_ok());
        let err = inputs.set("shift", "Evening".into()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidOption { .. }));
        assert_eq!(inputs.get("shift"), Some(&InputValue::Text("Night".into())));
    }

    #[test]
    fn test_blank_value_clears_field() {
        let mut inputs = HypotheticalInputs::new();
        inputs.set("materialSupplier", "Acme".into()).unwrap();
        inputs.set("materialSupplier", "   ".into()).unwrap();
        assert!(inputs.get("materialSupplier").is_none());
        assert!(!inputs.has_any());
    }

    #[test]
    fn test_filled_follows_catalogue_order() {
        let mut inputs = HypotheticalInputs::new();
        inputs.set("humidity", InputValue::Number(45.0)).unwrap();
        inputs.set("materialSupplier", "SupplierA".into()).unwrap();
        let ids: Vec<_> = inputs.filled().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["materialSupplier", "humidity"]);
    }

    #[test]
    fn test_input_value_untagged_serde() {
        let inputs: HypotheticalInputs =
            serde_json::from_str(r#"{"temperature": 22, "shift": "Day"}"#).unwrap();
        assert_eq!(inputs.get("temperature"), Some(&InputValue::Number(22.0)));
        assert_eq!(inputs.get("shift"), Some(&InputValue::Text("Day".into())));
        assert_eq!(InputValue::Number(22.0).to_string(), "22");
    }

    #[test]
    fn test_catalogue_serializes_type_field() {
        let json = serde_json::to_value(PREDICTION_PARAMETERS).unwrap();
        assert_eq!(json[1]["type"], "number");
        assert_eq!(json[1]["unit"], "°C");
        assert_eq!(json[3]["options"][1], "Night");
        assert!(json[0].get("options").is_none());
    }
}
