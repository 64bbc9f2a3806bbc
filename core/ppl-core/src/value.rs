//! Scalar values and rows flowing between operators.

use arrow::datatypes::{DataType, Schema};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::fmt;

/// A single typed value (or null).
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
}

/// One row: values aligned positionally with the producing operator's schema.
pub type Row = Vec<ScalarValue>;

impl ScalarValue {
    /// Get the Arrow DataType for this value.
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Float64(_) => DataType::Float64,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScalarValue::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Filter semantics: only `true` passes, null and false drop the row.
    pub fn is_true(&self) -> bool {
        matches!(self, ScalarValue::Boolean(true))
    }

    /// Widens the value to `target` (Int64 → Float64). Other combinations
    /// are returned unchanged.
    pub fn cast_to(self, target: &DataType) -> ScalarValue {
        match (self, target) {
            (ScalarValue::Int64(v), DataType::Float64) => ScalarValue::Float64(v as f64),
            (v, _) => v,
        }
    }

    /// Compares two non-null values. Numbers compare across Int64/Float64;
    /// incomparable kinds yield `None`.
    pub fn partial_cmp_value(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::Int64(a), ScalarValue::Int64(b)) => Some(a.cmp(b)),
            (ScalarValue::Utf8(a), ScalarValue::Utf8(b)) => Some(a.cmp(b)),
            (ScalarValue::Boolean(a), ScalarValue::Boolean(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Total order used by Sort: nulls compare greater than every value,
    /// incomparable kinds are ordered by kind.
    pub fn sort_cmp(&self, other: &ScalarValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self
                .partial_cmp_value(other)
                .unwrap_or_else(|| self.kind_rank().cmp(&other.kind_rank())),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            ScalarValue::Null => 0,
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Int64(_) | ScalarValue::Float64(_) => 2,
            ScalarValue::Utf8(_) => 3,
        }
    }

    /// Appends a hashable encoding of this value to a composite key.
    ///
    /// Integral floats encode like integers so `1` and `1.0` land in the
    /// same group or join bucket.
    pub fn append_to_key(&self, key: &mut Vec<u8>) {
        match self {
            ScalarValue::Null => key.push(0),
            ScalarValue::Boolean(b) => {
                key.push(1);
                key.push(*b as u8);
            }
            ScalarValue::Int64(v) => {
                key.push(2);
                key.extend_from_slice(&v.to_le_bytes());
            }
            ScalarValue::Float64(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    key.push(2);
                    key.extend_from_slice(&(*f as i64).to_le_bytes());
                } else {
                    key.push(3);
                    key.extend_from_slice(&f.to_bits().to_le_bytes());
                }
            }
            ScalarValue::Utf8(s) => {
                key.push(4);
                key.extend_from_slice(&(s.len() as u32).to_le_bytes());
                key.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Approximate heap + inline footprint, used for memory accounting.
    pub fn size_bytes(&self) -> usize {
        std::mem::size_of::<ScalarValue>()
            + match self {
                ScalarValue::Utf8(s) => s.capacity(),
                _ => 0,
            }
    }

    /// Converts a JSON document value into a scalar of the declared type.
    /// Values that cannot represent `target` become null; arrays contribute
    /// their first element.
    pub fn from_json(value: &Value, target: &DataType) -> ScalarValue {
        match (value, target) {
            (Value::Null, _) => ScalarValue::Null,
            (Value::Array(items), _) => items
                .first()
                .map(|v| ScalarValue::from_json(v, target))
                .unwrap_or(ScalarValue::Null),
            (Value::Bool(b), DataType::Boolean) => ScalarValue::Boolean(*b),
            (Value::Number(n), DataType::Int64) => match n.as_i64() {
                Some(v) => ScalarValue::Int64(v),
                None => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| ScalarValue::Int64(f as i64))
                    .unwrap_or(ScalarValue::Null),
            },
            (Value::Number(n), DataType::Float64) => {
                n.as_f64().map(ScalarValue::Float64).unwrap_or(ScalarValue::Null)
            }
            (Value::String(s), DataType::Utf8) => ScalarValue::Utf8(s.clone()),
            (Value::Number(n), DataType::Utf8) => ScalarValue::Utf8(n.to_string()),
            (Value::Bool(b), DataType::Utf8) => ScalarValue::Utf8(b.to_string()),
            (v, DataType::Null) => ScalarValue::infer_json(v),
            _ => ScalarValue::Null,
        }
    }

    /// Converts a JSON value using its own shape to pick the type.
    pub fn infer_json(value: &Value) -> ScalarValue {
        match value {
            Value::Bool(b) => ScalarValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(v) => ScalarValue::Int64(v),
                None => n.as_f64().map(ScalarValue::Float64).unwrap_or(ScalarValue::Null),
            },
            Value::String(s) => ScalarValue::Utf8(s.clone()),
            Value::Array(items) => items
                .first()
                .map(ScalarValue::infer_json)
                .unwrap_or(ScalarValue::Null),
            Value::Null | Value::Object(_) => ScalarValue::Null,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ScalarValue::Null => Value::Null,
            ScalarValue::Boolean(b) => Value::Bool(*b),
            ScalarValue::Int64(v) => Value::Number((*v).into()),
            ScalarValue::Float64(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            ScalarValue::Utf8(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::Int64(v) => write!(f, "{v}"),
            ScalarValue::Float64(v) => {
                let text = v.to_string();
                if text.contains(['.', 'e', 'E']) || !v.is_finite() {
                    write!(f, "{text}")
                } else {
                    write!(f, "{text}.0")
                }
            }
            ScalarValue::Utf8(s) => write!(f, "{s}"),
        }
    }
}

/// Builds the name → value object for one row.
pub fn row_to_json(row: &[ScalarValue], schema: &Schema) -> Value {
    let mut object = Map::with_capacity(row.len());
    for (field, value) in schema.fields().iter().zip(row) {
        object.insert(field.name().clone(), value.to_json());
    }
    Value::Object(object)
}

/// Approximate footprint of a buffered row.
pub fn row_size(row: &[ScalarValue]) -> usize {
    std::mem::size_of::<Row>() + row.iter().map(ScalarValue::size_bytes).sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::Field;
    use serde_json::json;

    #[test]
    fn numeric_comparison_crosses_types() {
        let a = ScalarValue::Int64(2);
        let b = ScalarValue::Float64(2.5);
        assert_eq!(a.partial_cmp_value(&b), Some(Ordering::Less));
        assert_eq!(
            ScalarValue::Utf8("a".into()).partial_cmp_value(&ScalarValue::Int64(1)),
            None
        );
    }

    #[test]
    fn nulls_sort_after_values() {
        let mut values = vec![
            ScalarValue::Null,
            ScalarValue::Int64(3),
            ScalarValue::Int64(1),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![ScalarValue::Int64(1), ScalarValue::Int64(3), ScalarValue::Null]
        );
    }

    #[test]
    fn integral_float_keys_match_integers() {
        let mut a = Vec::new();
        let mut b = Vec::new();
        ScalarValue::Int64(7).append_to_key(&mut a);
        ScalarValue::Float64(7.0).append_to_key(&mut b);
        assert_eq!(a, b);

        let mut c = Vec::new();
        ScalarValue::Utf8("7".into()).append_to_key(&mut c);
        assert_ne!(a, c);
    }

    #[test]
    fn json_conversion_follows_declared_type() {
        assert_eq!(
            ScalarValue::from_json(&json!(3), &DataType::Float64),
            ScalarValue::Float64(3.0)
        );
        assert_eq!(
            ScalarValue::from_json(&json!("x"), &DataType::Int64),
            ScalarValue::Null
        );
        assert_eq!(
            ScalarValue::from_json(&json!([5, 6]), &DataType::Int64),
            ScalarValue::Int64(5)
        );
    }

    #[test]
    fn float_display_keeps_decimal_point() {
        assert_eq!(ScalarValue::Float64(2.0).to_string(), "2.0");
        assert_eq!(ScalarValue::Float64(0.25).to_string(), "0.25");
    }

    #[test]
    fn row_to_json_uses_schema_names() {
        let schema = Schema::new(vec![
            Field::new("host", DataType::Utf8, true),
            Field::new("count", DataType::Int64, true),
        ]);
        let row = vec![ScalarValue::Utf8("a".into()), ScalarValue::Int64(2)];
        assert_eq!(row_to_json(&row, &schema), json!({"host": "a", "count": 2}));
    }
}
