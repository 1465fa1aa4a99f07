//! Effect identifiers.
//!
//! An [`EffectId`] correlates a *logical* effect across reducer invocations so
//! that it can be cancelled, replaced ("cancel in flight") or throttled.
//!
//! Any `Hash + Eq + Debug + Send + Sync + 'static` value can be used as an
//! identifier, as can a bare type (a "type tag"). The value is erased behind a
//! narrow wrapper that keeps its precomputed hash and explicit equality and
//! formatting function pointers, so lookups never need to know the concrete
//! type.
//!
//! # Example
//!
//! ```
//! use reducer_kit_core::effect_id::EffectId;
//!
//! struct SearchRequest;
//!
//! let by_type = EffectId::of::<SearchRequest>();
//! let by_value = EffectId::new(("row-timer", 42_u64));
//!
//! assert_eq!(by_type, EffectId::of::<SearchRequest>());
//! assert_eq!(by_value, EffectId::new(("row-timer", 42_u64)));
//! assert_ne!(by_value, EffectId::new(("row-timer", 43_u64)));
//! ```

use std::any::{Any, TypeId};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

type ErasedValue = dyn Any + Send + Sync;

/// A type-erased, hashable effect identifier.
#[derive(Clone)]
pub struct EffectId {
    value: Arc<ErasedValue>,
    type_id: TypeId,
    hash: u64,
    eq: fn(&ErasedValue, &ErasedValue) -> bool,
    fmt: fn(&ErasedValue, &mut fmt::Formatter<'_>) -> fmt::Result,
}

/// Marker used by [`EffectId::of`] to turn a type into an identifier value.
struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {}", self.name)
    }
}

fn erased_eq<T: PartialEq + 'static>(lhs: &ErasedValue, rhs: &ErasedValue) -> bool {
    match (lhs.downcast_ref::<T>(), rhs.downcast_ref::<T>()) {
        (Some(lhs), Some(rhs)) => lhs == rhs,
        _ => false,
    }
}

fn erased_fmt<T: fmt::Debug + 'static>(
    value: &ErasedValue,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    match value.downcast_ref::<T>() {
        Some(value) => fmt::Debug::fmt(value, f),
        None => f.write_str("<unknown>"),
    }
}

impl EffectId {
    /// Create an identifier from a value.
    #[must_use]
    pub fn new<T>(value: T) -> Self
    where
        T: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        let mut hasher = DefaultHasher::new();
        TypeId::of::<T>().hash(&mut hasher);
        value.hash(&mut hasher);

        Self {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            hash: hasher.finish(),
            eq: erased_eq::<T>,
            fmt: erased_fmt::<T>,
        }
    }

    /// Create an identifier from a type tag.
    ///
    /// All identifiers created for the same `T` are equal.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::new(TypeTag {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        })
    }

    /// Identifier derived from the structural position of child state.
    ///
    /// Used by the presence reducers (`IfLet`, `ForEach`, `IfCaseLet`) to tag
    /// every effect a child produces, so the effects can be torn down when the
    /// child state disappears.
    #[must_use]
    pub fn structural<K>(label: &'static str, key: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        Self::new(StructuralKey { label, key })
    }

    /// This identifier namespaced under `scope`.
    ///
    /// Presence reducers scope every identifier a child uses under the
    /// child's structural tag, so equal ids in sibling children never meet.
    #[must_use]
    pub fn scoped(&self, scope: &EffectId) -> Self {
        Self::new(ScopedKey {
            scope: scope.clone(),
            id: self.clone(),
        })
    }

    /// Downcast the underlying value.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

#[derive(Hash, PartialEq, Eq)]
struct StructuralKey<K> {
    label: &'static str,
    key: K,
}

impl<K: fmt::Debug> fmt::Debug for StructuralKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{:?}]", self.label, self.key)
    }
}

#[derive(Hash, PartialEq, Eq)]
struct ScopedKey {
    scope: EffectId,
    id: EffectId,
}

impl fmt::Debug for ScopedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.id)
    }
}

impl PartialEq for EffectId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
            && self.hash == other.hash
            && (self.eq)(&*self.value, &*other.value)
    }
}

impl Eq for EffectId {}

impl Hash for EffectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EffectId(")?;
        (self.fmt)(&*self.value, f)?;
        f.write_str(")")
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.fmt)(&*self.value, f)
    }
}
