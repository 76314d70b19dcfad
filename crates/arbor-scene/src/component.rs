//! Component kinds, attached-component metadata, and the capability bag.
//!
//! Every component carries a [`ComponentKind`] tag. Statically typed
//! components implement [`Component`] and get their kind from an associated
//! constant; data-driven components use [`DynamicComponent`], whose kind is
//! chosen at runtime. Both are stored behind the object-safe
//! [`AnyComponent`] trait.
//!
//! An entity's components live in a [`ComponentBag`]: an ordered list of
//! [`AttachedComponent`]s plus a kind-indexed view used for O(1) presence
//! checks and lookups. The two views are kept consistent on every attach and
//! detach.

use std::any::Any;
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

// ---------------------------------------------------------------------------
// ComponentKind
// ---------------------------------------------------------------------------

/// The capability tag identifying a component's semantic type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentKind(Cow<'static, str>);

impl ComponentKind {
    /// Build a kind from a static string without allocating.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// The kind as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentKind({})", self.0)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ComponentKind {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}

impl From<String> for ComponentKind {
    fn from(name: String) -> Self {
        Self(Cow::Owned(name))
    }
}

impl Borrow<str> for ComponentKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Component traits
// ---------------------------------------------------------------------------

/// A statically typed component.
///
/// ```
/// use arbor_scene::component::Component;
///
/// #[derive(Debug)]
/// struct Health(u32);
///
/// impl Component for Health {
///     const KIND: &'static str = "Health";
/// }
/// ```
pub trait Component: Any + Send + Sync + fmt::Debug {
    /// Kind tag shared by every instance of this type.
    const KIND: &'static str;
    /// Whether several instances of this kind may coexist on one entity.
    const ALLOW_MULTIPLE: bool = false;
}

/// Object-safe view over any component, typed or dynamic.
///
/// Implemented automatically for every [`Component`] and for
/// [`DynamicComponent`].
pub trait AnyComponent: Any + Send + Sync + fmt::Debug {
    /// The kind tag of this instance.
    fn kind(&self) -> ComponentKind;
    /// Whether this kind allows multiple instances per entity.
    fn allow_multiple(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> AnyComponent for T {
    fn kind(&self) -> ComponentKind {
        ComponentKind::from_static(T::KIND)
    }

    fn allow_multiple(&self) -> bool {
        T::ALLOW_MULTIPLE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// DynamicComponent
// ---------------------------------------------------------------------------

/// A component whose kind is decided at runtime and whose payload is JSON.
///
/// Used for data-driven scenes where the set of component kinds is not known
/// at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicComponent {
    /// Kind tag.
    pub kind: ComponentKind,
    /// Whether several instances of this kind may coexist on one entity.
    #[serde(default)]
    pub allow_multiple: bool,
    /// Arbitrary payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl DynamicComponent {
    /// A single-instance dynamic component with a `null` payload.
    pub fn new(kind: impl Into<ComponentKind>) -> Self {
        Self {
            kind: kind.into(),
            allow_multiple: false,
            data: serde_json::Value::Null,
        }
    }

    /// Replace the payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Allow several instances of this kind on one entity.
    pub fn multiple(mut self) -> Self {
        self.allow_multiple = true;
        self
    }
}

impl AnyComponent for DynamicComponent {
    fn kind(&self) -> ComponentKind {
        self.kind.clone()
    }

    fn allow_multiple(&self) -> bool {
        self.allow_multiple
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// AttachedComponent
// ---------------------------------------------------------------------------

/// A component attached to an entity, with a back-reference to its owner.
#[derive(Debug)]
pub struct AttachedComponent {
    owner: EntityId,
    kind: ComponentKind,
    allow_multiple: bool,
    inner: Box<dyn AnyComponent>,
}

impl AttachedComponent {
    fn new(owner: EntityId, inner: Box<dyn AnyComponent>) -> Self {
        Self {
            owner,
            kind: inner.kind(),
            allow_multiple: inner.allow_multiple(),
            inner,
        }
    }

    /// The entity this component is attached to.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn allow_multiple(&self) -> bool {
        self.allow_multiple
    }

    /// Borrow the component as a trait object.
    pub fn as_component(&self) -> &dyn AnyComponent {
        self.inner.as_ref()
    }

    /// Downcast to a concrete component type.
    pub fn downcast_ref<T: AnyComponent>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Mutably downcast to a concrete component type.
    pub fn downcast_mut<T: AnyComponent>(&mut self) -> Option<&mut T> {
        self.inner.as_any_mut().downcast_mut::<T>()
    }

    /// Take the component back out, dropping the owner link.
    pub fn into_inner(self) -> Box<dyn AnyComponent> {
        self.inner
    }
}

// ---------------------------------------------------------------------------
// ComponentBag
// ---------------------------------------------------------------------------

/// Where an attach landed in the bag.
#[derive(Debug)]
pub enum AttachOutcome {
    /// Appended at the given slot.
    Appended { slot: usize },
    /// Replaced the previous single-instance component in place.
    Replaced {
        slot: usize,
        previous: AttachedComponent,
    },
}

impl AttachOutcome {
    /// The slot the new component occupies.
    pub fn slot(&self) -> usize {
        match self {
            AttachOutcome::Appended { slot } | AttachOutcome::Replaced { slot, .. } => *slot,
        }
    }
}

/// Ordered capability bag with a kind-indexed view.
///
/// The kind index always points at the most recently attached instance of a
/// kind, so for multiple-capable kinds [`get`](Self::get) returns the newest
/// one.
#[derive(Debug, Default)]
pub struct ComponentBag {
    slots: Vec<AttachedComponent>,
    by_kind: HashMap<ComponentKind, usize>,
}

impl ComponentBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `component` on behalf of `owner`.
    pub(crate) fn attach(
        &mut self,
        owner: EntityId,
        component: Box<dyn AnyComponent>,
    ) -> AttachOutcome {
        let attached = AttachedComponent::new(owner, component);

        if !attached.allow_multiple {
            if let Some(&slot) = self.by_kind.get(attached.kind.as_str()) {
                let previous = std::mem::replace(&mut self.slots[slot], attached);
                return AttachOutcome::Replaced { slot, previous };
            }
        }

        let slot = self.slots.len();
        self.by_kind.insert(attached.kind.clone(), slot);
        self.slots.push(attached);
        AttachOutcome::Appended { slot }
    }

    /// Detach the indexed component of `kind`, if any.
    pub(crate) fn detach(&mut self, kind: &str) -> Option<AttachedComponent> {
        let slot = self.by_kind.remove(kind)?;
        let removed = self.slots.remove(slot);
        self.reindex();
        Some(removed)
    }

    /// Rebuild the kind index after slot positions shifted.
    fn reindex(&mut self) {
        self.by_kind.clear();
        for (slot, attached) in self.slots.iter().enumerate() {
            self.by_kind.insert(attached.kind.clone(), slot);
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.by_kind.contains_key(kind)
    }

    pub fn get(&self, kind: &str) -> Option<&AttachedComponent> {
        self.by_kind.get(kind).map(|&slot| &self.slots[slot])
    }

    pub fn get_mut(&mut self, kind: &str) -> Option<&mut AttachedComponent> {
        match self.by_kind.get(kind) {
            Some(&slot) => Some(&mut self.slots[slot]),
            None => None,
        }
    }

    /// Typed lookup by the component's own kind.
    pub fn get_typed<T: Component>(&self) -> Option<&T> {
        self.get(T::KIND).and_then(|c| c.downcast_ref::<T>())
    }

    /// Mutable typed lookup by the component's own kind.
    pub fn get_typed_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.get_mut(T::KIND).and_then(|c| c.downcast_mut::<T>())
    }

    /// Every attached instance of `kind`, in bag order.
    pub fn all_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a AttachedComponent> {
        self.slots.iter().filter(move |c| c.kind.as_str() == kind)
    }

    /// Number of attached components (counting every instance).
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Attached components in bag order.
    pub fn iter(&self) -> impl Iterator<Item = &AttachedComponent> {
        self.slots.iter()
    }

    /// Kinds in bag order (duplicates included for multiple-capable kinds).
    pub fn kinds(&self) -> impl Iterator<Item = &ComponentKind> {
        self.slots.iter().map(|c| &c.kind)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
