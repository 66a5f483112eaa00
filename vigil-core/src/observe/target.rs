//! Raw targets.
//!
//! A [`Target`] is a shared handle to one unobserved container. Everything on
//! it is raw: reading does not track and writing does not trigger. Observed
//! access goes through an [`Observed`](super::Observed) wrapper instead.
//!
//! Dropping the last handle to a target also drops every Dep the dependency
//! store recorded for it.

use std::cell::{Ref as CellRef, RefCell, RefMut};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use super::sequence::{Array, Sequence};
use super::value::{PropKey, Value};
use crate::diagnostics;
use crate::error::{ReactiveError, ReactiveResult};
use crate::reactive::Runtime;

/// Stable identity of a target, used to key the dependency store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

impl TargetId {
    /// Generate a new unique target ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// The kind of container a target is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// String-keyed properties in insertion order.
    Record,
    /// Dense indexed elements, plus non-index properties.
    Sequence,
    /// Value-keyed entries in insertion order.
    Map,
    /// Unique values in insertion order.
    Set,
}

impl TargetKind {
    /// Whether this kind uses the collection accessors.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::Map | Self::Set)
    }

    pub(crate) fn tag(self) -> &'static str {
        match self {
            Self::Record => "Object",
            Self::Sequence => "Array",
            Self::Map => "Map",
            Self::Set => "Set",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Record => "record",
            Self::Sequence => "sequence",
            Self::Map => "map",
            Self::Set => "set",
        })
    }
}

/// Result of a raw property write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    /// The key did not exist before.
    Added,
    /// The key existed and now holds a different value.
    Changed,
    /// The key existed and already held the value.
    Unchanged,
}

pub(crate) enum TargetData {
    Record(IndexMap<PropKey, Value>),
    Sequence {
        items: Box<dyn Sequence>,
        props: IndexMap<PropKey, Value>,
    },
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl TargetData {
    pub(crate) fn kind(&self) -> TargetKind {
        match self {
            Self::Record(_) => TargetKind::Record,
            Self::Sequence { .. } => TargetKind::Sequence,
            Self::Map(_) => TargetKind::Map,
            Self::Set(_) => TargetKind::Set,
        }
    }

    pub(crate) fn read(&self, key: &PropKey) -> Option<Value> {
        match self {
            Self::Record(props) => props.get(key).cloned(),
            Self::Sequence { items, props } => {
                if key.is_length() {
                    Some(Value::from(items.len()))
                } else if let Some(index) = key.as_index() {
                    items.items().get(index).cloned()
                } else {
                    props.get(key).cloned()
                }
            }
            Self::Map(_) | Self::Set(_) => None,
        }
    }

    pub(crate) fn contains_key(&self, key: &PropKey) -> bool {
        match self {
            Self::Record(props) => props.contains_key(key),
            Self::Sequence { items, props } => {
                key.is_length()
                    || key.as_index().is_some_and(|index| index < items.len())
                    || props.contains_key(key)
            }
            Self::Map(_) | Self::Set(_) => false,
        }
    }

    /// Store `value` under `key`. Writing past the end of a sequence fills
    /// the gap with `Undefined`.
    ///
    /// Sequences are dense, so a write that would grow one past
    /// [`MAX_SEQUENCE_LENGTH`] fails with [`ReactiveError::InvalidLength`].
    pub(crate) fn write(&mut self, key: &PropKey, value: Value) -> ReactiveResult<WriteOutcome> {
        let slot = match self {
            Self::Record(props) => return Ok(insert_prop(props, key, value)),
            Self::Sequence { items, props } => {
                if key.is_length() {
                    let new_len = parse_length(&value)?;
                    let old_len = items.len();
                    items.items_mut().resize(new_len, Value::Undefined);
                    return Ok(if new_len == old_len {
                        WriteOutcome::Unchanged
                    } else {
                        WriteOutcome::Changed
                    });
                }
                let Some(index) = key.as_index() else {
                    return Ok(insert_prop(props, key, value));
                };
                let items = items.items_mut();
                if index >= MAX_SEQUENCE_LENGTH {
                    return Err(ReactiveError::InvalidLength((index as u64 + 1).to_string()));
                }
                if index >= items.len() {
                    items.resize(index, Value::Undefined);
                    items.push(value);
                    return Ok(WriteOutcome::Added);
                }
                &mut items[index]
            }
            Self::Map(_) => return Err(ReactiveError::unsupported("set", TargetKind::Map)),
            Self::Set(_) => return Err(ReactiveError::unsupported("set", TargetKind::Set)),
        };

        if *slot == value {
            Ok(WriteOutcome::Unchanged)
        } else {
            *slot = value;
            Ok(WriteOutcome::Changed)
        }
    }

    /// Remove `key`, returning whether it existed.
    ///
    /// A sequence index keeps its slot and reads as `Undefined` afterwards.
    pub(crate) fn remove(&mut self, key: &PropKey) -> bool {
        match self {
            Self::Record(props) => props.shift_remove(key).is_some(),
            Self::Sequence { items, props } => {
                if key.is_length() {
                    return false;
                }
                match key.as_index() {
                    Some(index) => match items.items_mut().get_mut(index) {
                        Some(slot) => {
                            *slot = Value::Undefined;
                            true
                        }
                        None => false,
                    },
                    None => props.shift_remove(key).is_some(),
                }
            }
            Self::Map(_) | Self::Set(_) => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Record(props) => props.len(),
            Self::Sequence { items, .. } => items.len(),
            Self::Map(entries) => entries.len(),
            Self::Set(values) => values.len(),
        }
    }

    pub(crate) fn keys(&self) -> Vec<PropKey> {
        match self {
            Self::Record(props) => props.keys().cloned().collect(),
            Self::Sequence { items, props } => (0..items.len())
                .map(PropKey::from)
                .chain(props.keys().cloned())
                .collect(),
            Self::Map(_) | Self::Set(_) => Vec::new(),
        }
    }

    pub(crate) fn values(&self) -> Vec<Value> {
        match self {
            Self::Record(props) => props.values().cloned().collect(),
            Self::Sequence { items, .. } => items.items().to_vec(),
            Self::Map(entries) => entries.values().cloned().collect(),
            Self::Set(values) => values.iter().cloned().collect(),
        }
    }

    pub(crate) fn sequence(&self) -> Option<&dyn Sequence> {
        match self {
            Self::Sequence { items, .. } => Some(items.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn sequence_mut(&mut self) -> Option<&mut dyn Sequence> {
        match self {
            Self::Sequence { items, .. } => Some(items.as_mut()),
            _ => None,
        }
    }
}

fn insert_prop(props: &mut IndexMap<PropKey, Value>, key: &PropKey, value: Value) -> WriteOutcome {
    match props.get_mut(key) {
        Some(slot) if *slot == value => WriteOutcome::Unchanged,
        Some(slot) => {
            *slot = value;
            WriteOutcome::Changed
        }
        None => {
            props.insert(key.clone(), value);
            WriteOutcome::Added
        }
    }
}

/// Largest length a sequence target can grow to.
///
/// Elements are stored densely; lengths between this and 2^32 - 1 are
/// rejected instead of allocated.
pub const MAX_SEQUENCE_LENGTH: usize = 1 << 24;

/// A length must be a non-negative integer no larger than
/// [`MAX_SEQUENCE_LENGTH`].
fn parse_length(value: &Value) -> ReactiveResult<usize> {
    let invalid = || ReactiveError::InvalidLength(value.to_string());
    let n = match value {
        Value::Number(n) => *n,
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };
    if n.fract() != 0.0 || n < 0.0 || n > f64::from(u32::MAX) {
        return Err(invalid());
    }
    let len = n as usize;
    if len > MAX_SEQUENCE_LENGTH {
        return Err(invalid());
    }
    Ok(len)
}

struct TargetInner {
    id: TargetId,
    data: RefCell<TargetData>,
}

impl Drop for TargetInner {
    fn drop(&mut self) {
        Runtime::forget_target(self.id);
    }
}

/// A shared handle to a raw container.
///
/// Cloning the handle shares the container. Equality and hashing are by
/// identity.
#[derive(Clone)]
pub struct Target {
    inner: Rc<TargetInner>,
}

impl Target {
    fn from_data(data: TargetData) -> Self {
        Self {
            inner: Rc::new(TargetInner {
                id: TargetId::new(),
                data: RefCell::new(data),
            }),
        }
    }

    /// An empty record.
    pub fn record() -> Self {
        Self::record_from(std::iter::empty::<(PropKey, Value)>())
    }

    /// A record with the given properties, in order.
    pub fn record_from<K, V>(props: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<PropKey>,
        V: Into<Value>,
    {
        Self::from_data(TargetData::Record(
            props
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        ))
    }

    /// A plain sequence holding `items`.
    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::sequence(Array::from_iter(items.into_iter().map(Into::into)))
    }

    /// A sequence backed by a custom [`Sequence`] type.
    pub fn sequence<S: Sequence>(sequence: S) -> Self {
        Self::from_data(TargetData::Sequence {
            items: Box::new(sequence),
            props: IndexMap::new(),
        })
    }

    /// An empty map.
    pub fn map() -> Self {
        Self::map_from(std::iter::empty::<(Value, Value)>())
    }

    /// A map with the given entries, in order.
    pub fn map_from<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        Self::from_data(TargetData::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into().normalized_key(), value.into()))
                .collect(),
        ))
    }

    /// An empty set.
    pub fn empty_set() -> Self {
        Self::set_from(std::iter::empty::<Value>())
    }

    /// A set with the given values, in order.
    pub fn set_from<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::from_data(TargetData::Set(
            values
                .into_iter()
                .map(|value| value.into().normalized_key())
                .collect(),
        ))
    }

    /// The target's identity.
    pub fn id(&self) -> TargetId {
        self.inner.id
    }

    /// The kind of container.
    pub fn kind(&self) -> TargetKind {
        self.data().kind()
    }

    /// Whether both handles point at the same container.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read a record or sequence property. `Undefined` if absent.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        self.data().read(&key.into()).unwrap_or_default()
    }

    /// Write a record or sequence property without notifying anyone.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> ReactiveResult<()> {
        self.data_mut()
            .write(&key.into(), value.into())
            .map(|_| ())
            .map_err(diagnostics::report)
    }

    /// Whether a record or sequence has the property.
    pub fn contains_key(&self, key: impl Into<PropKey>) -> bool {
        self.data().contains_key(&key.into())
    }

    /// Number of properties, elements or entries.
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// Whether [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Property keys of a record, or indices then properties of a sequence.
    pub fn keys(&self) -> Vec<PropKey> {
        self.data().keys()
    }

    /// Values in order: record values, sequence elements, map values or set
    /// members.
    pub fn to_vec(&self) -> Vec<Value> {
        self.data().values()
    }

    /// Map entries, or set members paired with themselves.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        match &*self.data() {
            TargetData::Map(entries) => entries
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            TargetData::Set(values) => values.iter().map(|v| (v.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    /// Borrow a sequence target as its concrete type.
    ///
    /// Returns `None` for other kinds or a different concrete type.
    pub fn with_sequence<S: Sequence, R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        let data = self.data();
        let sequence = data.sequence()?.as_any().downcast_ref::<S>()?;
        Some(f(sequence))
    }

    /// Mutably borrow a sequence target as its concrete type.
    pub fn with_sequence_mut<S: Sequence, R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        let mut data = self.data_mut();
        let sequence = data.sequence_mut()?.as_any_mut().downcast_mut::<S>()?;
        Some(f(sequence))
    }

    pub(crate) fn data(&self) -> CellRef<'_, TargetData> {
        self.inner.data.borrow()
    }

    pub(crate) fn data_mut(&self) -> RefMut<'_, TargetData> {
        self.inner.data.borrow_mut()
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl Hash for Target {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Target");
        out.field("id", &self.inner.id);
        match self.inner.data.try_borrow() {
            Ok(data) => out.field("kind", &data.kind()).field("len", &data.len()),
            Err(_) => out.field("kind", &"<borrowed>"),
        };
        out.finish()
    }
}
