//! JSON payload decoding

use crate::record::RecordSet;
use crate::schema::{FeatureSchema, ValidationError};
use serde_json::{Map, Value};

/// Convert a parsed request body into a record set and check it against the
/// declared features.
///
/// The body must be a JSON array whose elements are all objects. On success
/// the full decoded set is returned, extra columns included; the schema check
/// only decides whether the payload is acceptable.
pub fn decode_payload(
    payload: &Value,
    schema: &FeatureSchema,
) -> Result<RecordSet, ValidationError> {
    let items = payload.as_array().ok_or(ValidationError::NotAListOfObjects)?;

    let objects = items
        .iter()
        .map(Value::as_object)
        .collect::<Option<Vec<&Map<String, Value>>>>()
        .ok_or(ValidationError::NotAListOfObjects)?;

    let records = RecordSet::from_objects(objects);
    schema.validate(&records)?;
    Ok(records)
}
