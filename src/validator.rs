//! Structural validation of inbound capture events.
//!
//! The capture flow only needs a verdict and the full list of problems; it
//! never interprets event contents itself.

use crate::constants::EPCIS_EVENT_TYPES;
use anyhow::{anyhow, Context, Result};
use chrono::DateTime;
use jsonschema::JSONSchema;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// An `Err` means the validator itself broke, not that events are invalid.
pub trait EventValidator: Send + Sync {
    fn validate(&self, events: &[Value]) -> Result<ValidationReport>;
}

/// Default rules for EPCIS-shaped events
#[derive(Debug, Default, Clone, Copy)]
pub struct EpcisEventValidator;

impl EpcisEventValidator {
    fn check_event(index: usize, event: &Value, errors: &mut Vec<String>) {
        let Some(object) = event.as_object() else {
            errors.push(format!("event[{index}]: not an object"));
            return;
        };

        match object.get("type").and_then(Value::as_str) {
            Some(t) if t.trim().is_empty() => {
                errors.push(format!("event[{index}]: missing type"));
            }
            Some(t) if !EPCIS_EVENT_TYPES.contains(&t) => {
                errors.push(format!("event[{index}]: unsupported type {t}"));
            }
            Some(_) => {}
            None => errors.push(format!("event[{index}]: missing type")),
        }

        if let Some(event_time) = object.get("eventTime") {
            let parses = event_time
                .as_str()
                .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok());
            if !parses {
                errors.push(format!("event[{index}]: invalid eventTime"));
            }
        }
    }
}

impl EventValidator for EpcisEventValidator {
    fn validate(&self, events: &[Value]) -> Result<ValidationReport> {
        let mut errors = Vec::new();
        for (index, event) in events.iter().enumerate() {
            Self::check_event(index, event, &mut errors);
        }
        Ok(ValidationReport::from_errors(errors))
    }
}

/// Validates each event against a JSON Schema document
pub struct SchemaEventValidator {
    compiled: JSONSchema,
}

impl SchemaEventValidator {
    pub fn from_value(schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::options()
            .compile(schema)
            .map_err(|e| anyhow!("Failed to compile JSON Schema: {e}"))?;
        Ok(Self { compiled })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let schema: Value = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse JSON in {}", path.display()))?;
        Self::from_value(&schema)
    }
}

impl EventValidator for SchemaEventValidator {
    fn validate(&self, events: &[Value]) -> Result<ValidationReport> {
        let mut errors = Vec::new();
        for (index, event) in events.iter().enumerate() {
            if let Err(failures) = self.compiled.validate(event) {
                for failure in failures {
                    let path = failure.instance_path.to_string();
                    if path.is_empty() {
                        errors.push(format!("event[{index}]: {failure}"));
                    } else {
                        errors.push(format!("event[{index}]: {failure} at {path}"));
                    }
                }
            }
        }
        Ok(ValidationReport::from_errors(errors))
    }
}
