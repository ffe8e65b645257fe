//! Dynamically-typed property values and the containers built from them

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::path::ObjectPath;

/// Property name → value, for one interface of one object
pub type PropertyBag = HashMap<String, Value>;

/// Interface name → properties, everything known about one object
pub type InterfaceMap = HashMap<String, PropertyBag>;

/// Object path → interfaces, ordered by path
pub type ObjectTree = BTreeMap<ObjectPath, InterfaceMap>;

/// A property value as produced by a transport adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Double(f64),
    Str(String),
    Path(ObjectPath),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(HashMap<String, Value>),
}

impl Value {
    /// Short name of the variant, for log messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::I16(_) => "i16",
            Value::U16(_) => "u16",
            Value::I32(_) => "i32",
            Value::U32(_) => "u32",
            Value::I64(_) => "i64",
            Value::U64(_) => "u64",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Path(_) => "path",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// String content of `Str` and `Path` values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Path(p) => Some(p.as_str()),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<ObjectPath> {
        match self {
            Value::Path(p) => Some(p.clone()),
            Value::Str(s) => Some(ObjectPath::new(s.as_str())),
            _ => None,
        }
    }

    /// Any integer variant that fits in an `i64`
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Byte(v) => Some(v.into()),
            Value::I16(v) => Some(v.into()),
            Value::U16(v) => Some(v.into()),
            Value::I32(v) => Some(v.into()),
            Value::U32(v) => Some(v.into()),
            Value::I64(v) => Some(v),
            Value::U64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Any integer variant that fits in a `u64`
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(v) => Some(v),
            _ => self.as_i64().and_then(|v| u64::try_from(v).ok()),
        }
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.as_u64().and_then(|v| u8::try_from(v).ok())
    }

    pub fn as_i16(&self) -> Option<i16> {
        self.as_i64().and_then(|v| i16::try_from(v).ok())
    }

    pub fn as_u16(&self) -> Option<u16> {
        self.as_u64().and_then(|v| u16::try_from(v).ok())
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|v| i32::try_from(v).ok())
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u64().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Byte arrays, whether sent as `Bytes` or as a list of `Byte`
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::Bytes(b) => Some(b.clone()),
            Value::List(items) => items.iter().map(Value::as_u8).collect(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Lists whose items are all strings
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        self.as_list()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    u8 => Byte,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f64 => Double,
    String => Str,
    ObjectPath => Path,
    Vec<u8> => Bytes,
    Vec<Value> => List,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<PropertyBag> for Value {
    fn from(v: PropertyBag) -> Self {
        Value::Dict(v)
    }
}

/// Build a `PropertyBag` from `(name, value)` pairs
///
/// ```rust
/// use ble_transport::{bag, Value};
///
/// let props = bag([("Connected", Value::Bool(true)), ("RSSI", Value::I16(-60))]);
/// assert_eq!(props.len(), 2);
/// ```
pub fn bag<K, V, I>(entries: I) -> PropertyBag
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
