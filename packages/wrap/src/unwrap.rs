//! Deep unwrapping - the inverse of `wrap`, back into host form.
//!
//! Used by the copying containers' `to_map`/`to_list` exports and by the
//! non-list-collection adapter's membership test. Containers come back as
//! fresh shared hosts holding recursively unwrapped elements; scalars map
//! straight back. Methods and nodes have no host form.

use formwork_model::{DateKind, ModelError, Number, Value};

use crate::host::{Host, HostDate, HostKey};

/// Convert a semantic value back to a host value, recursively.
///
/// Hashes become fresh host maps, sequences and collections become fresh
/// host lists; single-pass collections are drained (so this can fail with
/// [`ModelError::AlreadyConsumed`]). Methods and nodes cannot be unwrapped.
pub fn deep_unwrap(value: &Value) -> Result<Host, ModelError> {
    match value {
        Value::Null => Ok(Host::Null),
        Value::Bool(b) => Ok(Host::Bool(*b)),
        Value::Number(Number::Int(i)) => Ok(Host::Int(*i)),
        Value::Number(Number::Float(f)) => Ok(Host::Float(*f)),
        Value::Text(s) => Ok(Host::Str(s.to_string())),
        Value::Date(d) => Ok(Host::Date(match d.kind() {
            DateKind::Date => HostDate::Date(d.instant().date_naive()),
            DateKind::Time => HostDate::Time(d.instant().time()),
            DateKind::DateTime => HostDate::Timestamp(d.instant()),
            DateKind::Unknown => HostDate::Instant(d.instant()),
        })),
        Value::Hash(h) => {
            let keys = h.keys()?;
            let mut entries = Vec::with_capacity(keys.len());
            for key in keys {
                let key_str = key.as_str().ok_or_else(|| ModelError::Unsupported {
                    model: "hash",
                    operation: "unwrap of non-string key",
                })?;
                let entry = h.get(key_str)?.unwrap_or(Value::Null);
                entries.push((HostKey::Str(key_str.to_string()), deep_unwrap(&entry)?));
            }
            Ok(Host::map(entries))
        }
        Value::Seq(s) => {
            let len = s.len()?;
            let mut items = Vec::with_capacity(len);
            for i in 0..len {
                let item = s.get(i)?.unwrap_or(Value::Null);
                items.push(deep_unwrap(&item)?);
            }
            Ok(Host::list(items))
        }
        Value::Collection(c) => {
            let mut cursor = c.cursor();
            let mut items = Vec::new();
            while let Some(item) = cursor.next()? {
                items.push(deep_unwrap(&item)?);
            }
            Ok(Host::list(items))
        }
        Value::Method(_) => Err(ModelError::Unsupported {
            model: "method",
            operation: "unwrap to host form",
        }),
        Value::Node(_) => Err(ModelError::Unsupported {
            model: "node",
            operation: "unwrap to host form",
        }),
    }
}

/// Unwrap only the scalar layer, leaving containers as an error.
///
/// The membership test of the non-list-collection adapter relates a
/// template value back to host elements; only scalars have a meaningful
/// equality there, so anything else is a type mismatch.
pub fn unwrap_scalar(value: &Value) -> Result<Host, ModelError> {
    if value.is_scalar() {
        deep_unwrap(value)
    } else {
        Err(ModelError::LookupTypeMismatch {
            key: format!("{:?}", value),
            key_kind: value.kind_name(),
            container: "host collection",
        })
    }
}
