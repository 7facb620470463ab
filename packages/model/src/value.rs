//! The Value type - the closed set of template-visible semantic types.
//!
//! Every host value the execution engine ever sees has been mapped into
//! exactly one of these variants by an object wrapper. Scalars are stored
//! inline; containers and callables are trait objects behind `Arc`, so a
//! `Value` is always cheap to clone and safe to share across threads.
//!
//! A value's capability set is fixed at wrap time. Even when the underlying
//! host container mutates, the classification (hash vs. sequence vs.
//! collection) never changes afterwards.

use std::fmt;
use std::sync::Arc;

use crate::{DateValue, ModelError, Number};

/// Keyed lookup capability (maps, generic objects, configuration hashes).
///
/// `get` must distinguish "key absent" (`Ok(None)`) from "key present with a
/// null value" (`Ok(Some(Value::Null))`) where the backing container can
/// tell the difference.
pub trait HashModel: Send + Sync {
    /// Look up a value by string key.
    fn get(&self, key: &str) -> Result<Option<Value>, ModelError>;

    /// Whether the key is present, regardless of its value.
    fn contains_key(&self, key: &str) -> Result<bool, ModelError>;

    /// Number of entries.
    fn len(&self) -> Result<usize, ModelError>;

    /// Whether the hash has no entries.
    fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }

    /// The keys, wrapped as values.
    fn keys(&self) -> Result<Vec<Value>, ModelError>;

    /// The values, wrapped.
    fn values(&self) -> Result<Vec<Value>, ModelError>;
}

/// Indexed access capability (lists, arrays, copied sequences).
pub trait SeqModel: Send + Sync {
    /// The element at `index`, or `None` when the index is out of range.
    ///
    /// Sequence semantics tolerate overflow reads as "absent" rather than
    /// as an error.
    fn get(&self, index: usize) -> Result<Option<Value>, ModelError>;

    /// Number of elements.
    fn len(&self) -> Result<usize, ModelError>;

    /// Whether the sequence has no elements.
    fn is_empty(&self) -> Result<bool, ModelError> {
        Ok(self.len()? == 0)
    }
}

/// Iterable capability, possibly single-pass.
///
/// Obtaining a cursor always succeeds; a single-consumption source reports
/// [`ModelError::AlreadyConsumed`] on the first *use* of a second cursor,
/// not at cursor creation.
pub trait CollectionModel: Send + Sync {
    /// Derive a fresh cursor over the collection.
    fn cursor(&self) -> Box<dyn ModelCursor>;

    /// Membership test, for collections that support it.
    ///
    /// A type mismatch while relating `value` back to the host element space
    /// is an error, never a silent `false`.
    fn contains(&self, value: &Value) -> Result<bool, ModelError> {
        let _ = value;
        Err(ModelError::Unsupported {
            model: "collection",
            operation: "contains",
        })
    }

    /// Number of elements, for collections that can count without consuming.
    fn len(&self) -> Result<usize, ModelError> {
        Err(ModelError::Unsupported {
            model: "collection",
            operation: "len",
        })
    }
}

/// A cursor over a [`CollectionModel`].
pub trait ModelCursor: Send {
    /// Whether another element is available.
    fn has_next(&mut self) -> Result<bool, ModelError>;

    /// The next element, or `None` when exhausted.
    fn next(&mut self) -> Result<Option<Value>, ModelError>;
}

/// Callable capability (host methods exposed to templates).
pub trait MethodModel: Send + Sync {
    /// Invoke with already-wrapped arguments.
    fn exec(&self, args: &[Value]) -> Result<Value, ModelError>;
}

/// Tree-navigable capability (document/AST nodes).
///
/// A node may additionally expose its attributes as a hash; the default is
/// no hash facet.
pub trait NodeModel: Send + Sync {
    /// The node's name.
    fn node_name(&self) -> Result<String, ModelError>;

    /// The node's type tag (element, text, ...), free-form.
    fn node_type(&self) -> Result<String, ModelError>;

    /// The parent node, if any.
    fn parent(&self) -> Result<Option<Value>, ModelError>;

    /// Child nodes in document order.
    fn children(&self) -> Result<Vec<Value>, ModelError>;

    /// Optional hash facet (attributes by name).
    fn as_hash(&self) -> Option<&dyn HashModel> {
        None
    }
}

/// A template-visible semantic value.
///
/// This is a closed classification space: the wrapper's routing decision
/// picks exactly one variant per host value, and there are no other
/// representations. `Null` is a value in its own right - "key present with
/// null" and "key absent" stay distinguishable.
#[derive(Clone)]
pub enum Value {
    /// The null value (not absence).
    Null,
    /// Boolean capability.
    Bool(bool),
    /// Numeric capability.
    Number(Number),
    /// String scalar capability.
    Text(Arc<str>),
    /// Date/time capability with flavor.
    Date(DateValue),
    /// Keyed lookup capability.
    Hash(Arc<dyn HashModel>),
    /// Indexed access capability.
    Seq(Arc<dyn SeqModel>),
    /// Iterable (possibly single-pass) capability.
    Collection(Arc<dyn CollectionModel>),
    /// Callable capability.
    Method(Arc<dyn MethodModel>),
    /// Tree-navigable capability.
    Node(Arc<dyn NodeModel>),
}

impl Value {
    /// The boolean true value. Wrappers hand this out instead of allocating.
    pub const TRUE: Value = Value::Bool(true);

    /// The boolean false value.
    pub const FALSE: Value = Value::Bool(false);

    /// Build a string scalar.
    pub fn text(s: impl Into<Arc<str>>) -> Self {
        Value::Text(s.into())
    }

    /// Build a numeric value.
    pub fn number(n: impl Into<Number>) -> Self {
        Value::Number(n.into())
    }

    /// Whether this is the null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is a terminal scalar (null, bool, number, text,
    /// date) as opposed to a container or callable.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Text(_) | Value::Date(_)
        )
    }

    /// The string payload, if this is a text scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The numeric payload, if any.
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The date payload, if any.
    pub fn as_date(&self) -> Option<DateValue> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// The hash capability, if this value exposes one.
    ///
    /// Nodes may expose a hash facet in addition to being tree-navigable;
    /// this is the one place a value shows two capabilities at once.
    pub fn as_hash(&self) -> Option<&dyn HashModel> {
        match self {
            Value::Hash(h) => Some(h.as_ref()),
            Value::Node(n) => n.as_hash(),
            _ => None,
        }
    }

    /// The sequence capability, if any.
    pub fn as_seq(&self) -> Option<&dyn SeqModel> {
        match self {
            Value::Seq(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// The iterable capability, if any.
    pub fn as_collection(&self) -> Option<&dyn CollectionModel> {
        match self {
            Value::Collection(c) => Some(c.as_ref()),
            _ => None,
        }
    }

    /// The callable capability, if any.
    pub fn as_method(&self) -> Option<&dyn MethodModel> {
        match self {
            Value::Method(m) => Some(m.as_ref()),
            _ => None,
        }
    }

    /// The node capability, if any.
    pub fn as_node(&self) -> Option<&dyn NodeModel> {
        match self {
            Value::Node(n) => Some(n.as_ref()),
            _ => None,
        }
    }

    /// Short tag naming the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
            Value::Date(_) => "date",
            Value::Hash(_) => "hash",
            Value::Seq(_) => "sequence",
            Value::Collection(_) => "collection",
            Value::Method(_) => "method",
            Value::Node(_) => "node",
        }
    }
}

/// Scalars compare structurally; containers and callables compare by
/// identity (same shared model instance).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => Arc::ptr_eq(a, b),
            (Value::Seq(a), Value::Seq(b)) => Arc::ptr_eq(a, b),
            (Value::Collection(a), Value::Collection(b)) => Arc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Arc::ptr_eq(a, b),
            (Value::Node(a), Value::Node(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::Text(s) => write!(f, "Text({:?})", s),
            Value::Date(d) => write!(f, "Date({:?})", d),
            other => f.write_str(other.kind_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        if b {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(Arc::from(s.as_str()))
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Number::Int(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(Number::Float(v))
    }
}

impl From<DateValue> for Value {
    fn from(d: DateValue) -> Self {
        Value::Date(d)
    }
}
