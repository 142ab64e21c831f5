use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

/// Tag identifying the payload kind of an [`AttrValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrKind {
    I64,
    F32,
    Bool,
    String,
    I64s,
    F32s,
    Bools,
    Strings,
}

/// Tagged attribute payload attached to an op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    I64(i64),
    F32(f32),
    Bool(bool),
    String(String),
    I64s(Vec<i64>),
    F32s(Vec<f32>),
    Bools(Vec<bool>),
    Strings(Vec<String>),
}

impl AttrValue {
    pub fn kind(&self) -> AttrKind {
        match self {
            AttrValue::I64(_) => AttrKind::I64,
            AttrValue::F32(_) => AttrKind::F32,
            AttrValue::Bool(_) => AttrKind::Bool,
            AttrValue::String(_) => AttrKind::String,
            AttrValue::I64s(_) => AttrKind::I64s,
            AttrValue::F32s(_) => AttrKind::F32s,
            AttrValue::Bools(_) => AttrKind::Bools,
            AttrValue::Strings(_) => AttrKind::Strings,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::I64(value)
    }
}

impl From<f32> for AttrValue {
    fn from(value: f32) -> Self {
        AttrValue::F32(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        AttrValue::I64s(value)
    }
}

impl From<&[i64]> for AttrValue {
    fn from(value: &[i64]) -> Self {
        AttrValue::I64s(value.to_vec())
    }
}

impl From<Vec<f32>> for AttrValue {
    fn from(value: Vec<f32>) -> Self {
        AttrValue::F32s(value)
    }
}

impl From<Vec<bool>> for AttrValue {
    fn from(value: Vec<bool>) -> Self {
        AttrValue::Bools(value)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(value: Vec<String>) -> Self {
        AttrValue::Strings(value)
    }
}

/// Types that can be read back out of an [`AttrValue`] with tag checking.
pub trait FromAttr: Sized {
    fn from_attr(value: &AttrValue) -> Option<&Self>;
}

macro_rules! impl_from_attr {
    ($ty:ty, $variant:ident) => {
        impl FromAttr for $ty {
            fn from_attr(value: &AttrValue) -> Option<&Self> {
                match value {
                    AttrValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_from_attr!(i64, I64);
impl_from_attr!(f32, F32);
impl_from_attr!(bool, Bool);
impl_from_attr!(String, String);
impl_from_attr!(Vec<i64>, I64s);
impl_from_attr!(Vec<f32>, F32s);
impl_from_attr!(Vec<bool>, Bools);
impl_from_attr!(Vec<String>, Strings);

/// Reads `value` as `T`, failing with `InvalidArgument` on a tag mismatch.
pub(crate) fn read_attr<'a, T: FromAttr>(name: &str, value: &'a AttrValue) -> GraphResult<&'a T> {
    T::from_attr(value).ok_or_else(|| {
        GraphError::invalid_argument(format!(
            "attribute {name} holds {:?}, requested a different kind",
            value.kind()
        ))
    })
}
