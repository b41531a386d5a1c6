//! Schema validation
//!
//! Each entity declares a JSON Schema (draft 7). Mappers validate before
//! building any statement; a failure becomes a VALIDATION error carrying every
//! violation message.

use hackhub_core::{DataError, DataResult};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

/// A compiled entity schema.
pub struct EntitySchema {
    name: &'static str,
    validator: Result<jsonschema::Validator, String>,
}

impl EntitySchema {
    /// Compile `schema`. A schema that fails to compile rejects every value.
    pub fn compile(name: &'static str, schema: &JsonValue) -> Self {
        let validator = jsonschema::draft7::new(schema).map_err(|e| e.to_string());
        if let Err(e) = &validator {
            tracing::error!(schema = name, error = %e, "invalid entity schema");
        }
        Self { name, validator }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `Ok` or every violation joined with `; `.
    pub fn check(&self, value: &JsonValue) -> Result<(), String> {
        match &self.validator {
            Ok(validator) => collect_errors(validator, value),
            Err(e) => Err(format!("Invalid schema for {}: {}", self.name, e)),
        }
    }

    /// Serialize `entity` and check it, mapping failure to VALIDATION.
    pub fn validate<T: Serialize>(&self, entity: &T) -> DataResult<()> {
        let value = serde_json::to_value(entity)?;
        self.check(&value).map_err(DataError::validation)
    }
}

fn collect_errors(validator: &jsonschema::Validator, value: &JsonValue) -> Result<(), String> {
    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Validate `value` against an uncompiled `schema`.
pub fn validate(schema: &JsonValue, value: &JsonValue) -> Result<(), String> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| format!("Invalid schema: {}", e))?;
    collect_errors(&validator, value)
}

// ============================================================================
// ENTITY SCHEMAS
// ============================================================================

pub static HACKATHON_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::compile(
        "hackathon",
        &json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "uid": { "type": "string", "minLength": 1, "maxLength": 45 },
                "name": { "type": "string", "minLength": 1, "maxLength": 45 },
                "start_time": { "type": "integer", "minimum": 0 },
                "end_time": { "type": ["integer", "null"], "minimum": 0 },
                "base_pin": { "type": ["integer", "null"], "minimum": 0 },
                "active": { "type": "boolean" }
            },
            "required": ["uid", "name", "start_time"]
        }),
    )
});

pub static CATEGORY_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::compile(
        "category",
        &json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "uid": { "type": "integer", "minimum": 0 },
                "category_name": { "type": "string", "minLength": 1, "maxLength": 255 },
                "is_sponsor": { "type": "boolean" }
            },
            "required": ["category_name"]
        }),
    )
});

pub static PROJECT_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::compile(
        "project",
        &json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "uid": { "type": "integer", "minimum": 0 },
                "project_name": { "type": "string", "minLength": 1, "maxLength": 255 },
                "hackathon": { "type": "string", "minLength": 1 },
                "team": {
                    "type": "array",
                    "items": { "type": "string", "minLength": 1 },
                    "maxItems": 5,
                    "uniqueItems": true
                },
                "categories": {
                    "type": "array",
                    "items": { "type": "integer", "minimum": 0 },
                    "uniqueItems": true
                }
            },
            "required": ["project_name"]
        }),
    )
});

pub static LIVE_UPDATE_SCHEMA: Lazy<EntitySchema> = Lazy::new(|| {
    EntitySchema::compile(
        "live-update",
        &json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": {
                "uid": { "type": "string", "minLength": 1 },
                "update_title": { "type": "string", "minLength": 1, "maxLength": 100 },
                "update_text": { "type": "string", "minLength": 1 },
                "update_image": { "type": ["string", "null"] },
                "update_time": { "type": "integer", "minimum": 0 }
            },
            "required": ["update_title", "update_text", "update_time"]
        }),
    )
});
