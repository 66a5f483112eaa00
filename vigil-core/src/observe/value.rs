//! Dynamic values stored in observed containers.
//!
//! Observed targets hold loosely typed data: a record can map one key to a
//! number and the next to a nested sequence. [`Value`] is that data, and
//! [`PropKey`] is the string key used by records and sequences.
//!
//! # Equality
//!
//! `Value`'s `PartialEq` is SameValue: `NaN` equals `NaN`, `+0` and `-0`
//! differ, and containers, wrappers and refs compare by identity. `Hash` and
//! `Eq` agree with it, so any value can key a map or set target. The other
//! two comparisons sequences need are [`Value::strict_equals`] (used by
//! `index_of`) and [`Value::same_value_zero`] (used by `includes`).

use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::target::{Target, TargetKind};
use super::wrapper::Observed;
use crate::reactive::Ref;

/// A dynamically typed value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absent value. Also what a hole or a deleted sequence slot reads as.
    #[default]
    Undefined,
    /// An explicit null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A double-precision number.
    Number(f64),
    /// An immutable string.
    String(Rc<str>),
    /// A raw, unobserved container.
    Object(Target),
    /// An observed wrapper around a container.
    Observed(Observed),
    /// A reactive cell holding another value.
    Ref(Ref<Value>),
}

impl Value {
    /// Whether this is `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether this is a ref.
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::Ref(_))
    }

    /// Whether this is a container, raw or observed.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Observed(_))
    }

    /// The number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The ref, if this is one.
    pub fn as_ref_cell(&self) -> Option<&Ref<Value>> {
        match self {
            Self::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// The observed wrapper, if this is one.
    pub fn as_observed(&self) -> Option<&Observed> {
        match self {
            Self::Observed(o) => Some(o),
            _ => None,
        }
    }

    /// The raw target behind this value, unwrapping an observed wrapper.
    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Self::Object(target) => Some(target),
            Self::Observed(observed) => Some(observed.raw()),
            _ => None,
        }
    }

    /// The container kind, if this is a container.
    pub fn kind(&self) -> Option<TargetKind> {
        self.as_target().map(Target::kind)
    }

    /// This value with any observed wrapper replaced by its raw target.
    pub fn to_raw(&self) -> Value {
        match self {
            Self::Observed(observed) => Self::Object(observed.raw().clone()),
            other => other.clone(),
        }
    }

    /// `===`: like SameValue, except `NaN` never matches and the zeroes do.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b,
            _ => self == other,
        }
    }

    /// SameValueZero: like SameValue, except the zeroes match.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    /// The key form of this value for map and set storage: `-0` becomes `+0`.
    pub(crate) fn normalized_key(self) -> Value {
        match self {
            Self::Number(n) if n == 0.0 => Self::Number(0.0),
            other => other,
        }
    }

    /// The property key this value names when used to index a record.
    pub fn to_prop_key(&self) -> PropKey {
        match self {
            Self::String(s) => PropKey(Rc::clone(s)),
            Self::Number(n) => PropKey::from(*n),
            other => PropKey::from(other.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => number_bits(*a) == number_bits(*b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Observed(a), Self::Observed(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Undefined | Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => number_bits(*n).hash(state),
            Self::String(s) => s.hash(state),
            Self::Object(target) => target.hash(state),
            Self::Observed(observed) => observed.hash(state),
            Self::Ref(cell) => cell.hash(state),
        }
    }
}

/// Bit pattern with every NaN collapsed to one.
fn number_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

/// Format a number the way `String(n)` would for the common cases.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n == 0.0 {
        "0".to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => f.write_str(s),
            Self::Object(target) => write!(f, "[object {}]", target.kind().tag()),
            Self::Observed(observed) => write!(f, "[object {}]", observed.kind().tag()),
            Self::Ref(cell) => write!(f, "{}", cell.get_untracked()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Self::Object(target)
    }
}

impl From<Observed> for Value {
    fn from(observed: Observed) -> Self {
        Self::Observed(observed)
    }
}

impl From<Ref<Value>> for Value {
    fn from(cell: Ref<Value>) -> Self {
        Self::Ref(cell)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// JSON objects become records and arrays become sequences, recursively.
impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::from(s),
            serde_json::Value::Array(items) => {
                Self::Object(Target::array(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(fields) => Self::Object(Target::record_from(
                fields.into_iter().map(|(key, value)| (PropKey::from(key), Value::from(value))),
            )),
        }
    }
}

/// A property key of a record or sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropKey(Rc<str>);

/// Largest valid array index plus one.
const MAX_INDEX: u64 = u32::MAX as u64;

impl PropKey {
    /// The `"length"` key.
    pub fn length() -> Self {
        Self::from("length")
    }

    /// Whether this is the `"length"` key.
    pub fn is_length(&self) -> bool {
        &*self.0 == "length"
    }

    /// The array index this key names, if it is a canonical integer index.
    ///
    /// `"01"`, `"-1"`, `"1.5"` and `"NaN"` are plain properties, not indices.
    pub fn as_index(&self) -> Option<usize> {
        let s = &*self.0;
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if s.len() > 1 && s.starts_with('0') {
            return None;
        }
        let n: u64 = s.parse().ok()?;
        if n < MAX_INDEX {
            usize::try_from(n).ok()
        } else {
            None
        }
    }

    /// The key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PropKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropKey {
    fn from(s: &str) -> Self {
        Self(Rc::from(s))
    }
}

impl From<String> for PropKey {
    fn from(s: String) -> Self {
        Self(Rc::from(s))
    }
}

impl From<&PropKey> for PropKey {
    fn from(key: &PropKey) -> Self {
        key.clone()
    }
}

impl From<usize> for PropKey {
    fn from(index: usize) -> Self {
        Self::from(index.to_string())
    }
}

impl From<i32> for PropKey {
    fn from(n: i32) -> Self {
        Self::from(n.to_string())
    }
}

impl From<i64> for PropKey {
    fn from(n: i64) -> Self {
        Self::from(n.to_string())
    }
}

impl From<f64> for PropKey {
    fn from(n: f64) -> Self {
        Self::from(format_number(n))
    }
}
