//! Schema helpers and the schema-provider collaborator.
//!
//! Schemas are plain Arrow schemas. Provider schemas may nest `Struct`
//! fields; they are flattened into dotted leaf names so that `user.name`
//! resolves like any other field.

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Row-count estimate for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub row_count: u64,
}

impl Statistics {
    pub fn new(row_count: u64) -> Self {
        Self { row_count }
    }
}

/// Resolves source (index) names to their schema.
///
/// Passed explicitly into every compilation; implementations must be safe to
/// share between concurrent compilations.
pub trait SchemaProvider: Send + Sync {
    /// Schema of `source`, or `None` when the source is unknown.
    fn schema(&self, source: &str) -> Option<SchemaRef>;

    /// Optional statistics used by the cost estimates.
    fn statistics(&self, _source: &str) -> Option<Statistics> {
        None
    }
}

/// Maps any Arrow type to the normalized set the engine computes with.
pub fn normalize_type(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Boolean => DataType::Boolean,
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => DataType::Int64,
        DataType::Float16 | DataType::Float32 | DataType::Float64 => DataType::Float64,
        DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => DataType::Float64,
        DataType::Null => DataType::Null,
        _ => DataType::Utf8,
    }
}

/// Flattens nested struct fields and normalizes every leaf type.
pub fn flatten_schema(schema: &Schema) -> Schema {
    let mut fields = Vec::new();
    for field in schema.fields() {
        flatten_field("", field, &mut fields);
    }
    Schema::new(fields)
}

fn flatten_field(prefix: &str, field: &Field, out: &mut Vec<Field>) {
    let name = if prefix.is_empty() {
        field.name().clone()
    } else {
        format!("{prefix}.{}", field.name())
    };
    match field.data_type() {
        DataType::Struct(children) => {
            for child in children {
                flatten_field(&name, child, out);
            }
        }
        other => out.push(Field::new(name, normalize_type(other), true)),
    }
}

/// Builds a nullable schema from `(name, type)` pairs.
pub fn schema_from_pairs<I, S>(pairs: I) -> SchemaRef
where
    I: IntoIterator<Item = (S, DataType)>,
    S: Into<String>,
{
    let fields: Vec<Field> = pairs
        .into_iter()
        .map(|(name, data_type)| Field::new(name, data_type, true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// Field names of `schema` in order.
pub fn field_names(schema: &Schema) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

/// Data type of `name`, if present.
pub fn field_type(schema: &Schema, name: &str) -> Option<DataType> {
    schema
        .fields()
        .iter()
        .find(|f| f.name() == name)
        .map(|f| f.data_type().clone())
}

pub fn is_numeric(data_type: &DataType) -> bool {
    matches!(data_type, DataType::Int64 | DataType::Float64)
}
