//! Cached, positionally aligned views over the component stores.
//!
//! A [`View`] holds every live entity whose mask satisfies the view mask,
//! plus one column of dense store slots per required type. For every index
//! `i`, `entities[i]` owns the instance at `columns[k][i]` in the store of
//! `types[k]`. The [`ViewCache`] keeps that true across every add, remove,
//! swap-remove relocation and store reorder.

use std::collections::HashMap;

use engine_component::{ComponentFlag, Entity, Mask};
use tracing::debug;

use crate::entities::EntityTable;
use crate::store::{ComponentStore, Relocation};

/// Index of a view inside its [`ViewCache`]. Views are never dropped, so
/// an id stays valid for the world's lifetime.
pub type ViewId = usize;

/// Callback fired when an entity joins or leaves a view.
pub type EntityHook = Box<dyn FnMut(Entity)>;

/// Enter/exit callbacks attached to a view on behalf of one system.
pub struct ViewHooks {
    pub owner: String,
    pub on_enter: Option<EntityHook>,
    pub on_exit: Option<EntityHook>,
}

impl std::fmt::Debug for ViewHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewHooks")
            .field("owner", &self.owner)
            .field("on_enter", &self.on_enter.is_some())
            .field("on_exit", &self.on_exit.is_some())
            .finish()
    }
}

#[derive(Debug)]
pub struct View {
    types: Vec<ComponentFlag>,
    mask: Mask,
    entities: Vec<Entity>,
    /// One column per entry of `types`, each aligned with `entities`.
    columns: Vec<Vec<usize>>,
    positions: HashMap<Entity, usize>,
    hooks: Vec<ViewHooks>,
}

impl View {
    fn new(types: Vec<ComponentFlag>, mask: Mask) -> Self {
        let columns = vec![Vec::new(); types.len()];
        Self {
            types,
            mask,
            entities: Vec::new(),
            columns,
            positions: HashMap::new(),
            hooks: Vec::new(),
        }
    }

    /// Required types, in the order the view was first requested with.
    pub fn types(&self) -> &[ComponentFlag] {
        &self.types
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Matched entities in iteration order.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// The store slots of `types()[k]`, aligned with [`entities`](Self::entities).
    pub fn column(&self, k: usize) -> &[usize] {
        &self.columns[k]
    }

    /// Which column holds `flag`, if the view requires it.
    pub fn column_of(&self, flag: ComponentFlag) -> Option<usize> {
        self.types.iter().position(|&t| t == flag)
    }

    pub fn position(&self, entity: Entity) -> Option<usize> {
        self.positions.get(&entity).copied()
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.positions.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Attach callbacks; any hooks previously attached by the same owner
    /// are replaced.
    pub fn attach(&mut self, hooks: ViewHooks) {
        self.detach(&hooks.owner);
        self.hooks.push(hooks);
    }

    pub fn detach(&mut self, owner: &str) {
        self.hooks.retain(|hooks| hooks.owner != owner);
    }

    /// Append `entity`, resolving its slot in every required store.
    ///
    /// Returns `false` (and leaves the view untouched) if any store lacks
    /// an instance for the entity.
    fn push(&mut self, entity: Entity, stores: &[ComponentStore]) -> bool {
        let slots: Option<Vec<usize>> = self
            .types
            .iter()
            .map(|flag| stores[flag.index()].slot_of(entity))
            .collect();
        let Some(slots) = slots else {
            return false;
        };

        self.positions.insert(entity, self.entities.len());
        self.entities.push(entity);
        for (column, slot) in self.columns.iter_mut().zip(slots) {
            column.push(slot);
        }
        true
    }

    /// Remove `entity` from the entity list and every column at the same
    /// index, shifting later entries down so iteration order is kept.
    fn evict(&mut self, entity: Entity) -> bool {
        let Some(index) = self.positions.remove(&entity) else {
            return false;
        };
        self.entities.remove(index);
        for column in &mut self.columns {
            column.remove(index);
        }
        for (i, &shifted) in self.entities.iter().enumerate().skip(index) {
            self.positions.insert(shifted, i);
        }
        true
    }

    /// Re-point the `column` entry of `relocation.entity` at its new slot.
    fn relocate(&mut self, column: usize, relocation: Relocation) {
        if let Some(&index) = self.positions.get(&relocation.entity) {
            self.columns[column][index] = relocation.slot;
        }
    }

    /// Rebuild column `k` from the store index after a reorder.
    fn resolve_column(&mut self, k: usize, store: &ComponentStore) {
        for (i, &entity) in self.entities.iter().enumerate() {
            if let Some(slot) = store.slot_of(entity) {
                self.columns[k][i] = slot;
            }
        }
    }

    fn fire_enter(&mut self, entity: Entity) {
        for hooks in &mut self.hooks {
            if let Some(on_enter) = hooks.on_enter.as_mut() {
                on_enter(entity);
            }
        }
    }

    fn fire_exit(&mut self, entity: Entity) {
        for hooks in &mut self.hooks {
            if let Some(on_exit) = hooks.on_exit.as_mut() {
                on_exit(entity);
            }
        }
    }
}

/// Every view of a world, shared by mask and indexed by required type.
#[derive(Debug, Default)]
pub struct ViewCache {
    views: Vec<View>,
    by_mask: HashMap<Mask, ViewId>,
    /// Flag index → views requiring that flag, in creation order.
    by_type: Vec<Vec<ViewId>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, mask: &Mask) -> Option<ViewId> {
        self.by_mask.get(mask).copied()
    }

    /// Return the view for `mask`, building it if needed.
    ///
    /// A new view scans the store of the first listed type and keeps the
    /// entities whose mask satisfies the view, in that store's order.
    pub fn get_or_create(
        &mut self,
        types: &[ComponentFlag],
        mask: Mask,
        stores: &[ComponentStore],
        entities: &EntityTable,
    ) -> ViewId {
        if let Some(id) = self.find(&mask) {
            return id;
        }

        let mut view = View::new(types.to_vec(), mask.clone());
        if let Some(first) = types.first() {
            for entity in stores[first.index()].entities() {
                let satisfied = entities
                    .mask(entity)
                    .is_some_and(|current| current.contains_all(&mask));
                if satisfied {
                    view.push(entity, stores);
                }
            }
        }

        let id = self.views.len();
        debug!(view = id, types = ?types, matched = view.len(), "view created");
        for flag in types {
            if self.by_type.len() <= flag.index() {
                self.by_type.resize_with(flag.index() + 1, Vec::new);
            }
            self.by_type[flag.index()].push(id);
        }
        self.views.push(view);
        self.by_mask.insert(mask, id);
        id
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.views.get(id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(id)
    }

    /// Views requiring `flag`, in creation order.
    pub fn touching(&self, flag: ComponentFlag) -> &[ViewId] {
        self.by_type
            .get(flag.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All views, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ViewId, &View)> {
        self.views.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// `entity` just gained `flag` and now has `mask`: push it into every
    /// view requiring `flag` that it newly satisfies, firing enter hooks.
    pub fn admit(
        &mut self,
        entity: Entity,
        flag: ComponentFlag,
        mask: &Mask,
        stores: &[ComponentStore],
    ) {
        for &id in self.by_type.get(flag.index()).into_iter().flatten() {
            let view = &mut self.views[id];
            if view.contains(entity) || !mask.contains_all(&view.mask) {
                continue;
            }
            if view.push(entity, stores) {
                debug!(%entity, view = id, "entity entered view");
                view.fire_enter(entity);
            }
        }
    }

    /// `entity` is losing `flag`: evict it from every view requiring
    /// `flag` that holds it, firing exit hooks.
    pub fn evict(&mut self, entity: Entity, flag: ComponentFlag) {
        for &id in self.by_type.get(flag.index()).into_iter().flatten() {
            let view = &mut self.views[id];
            if view.evict(entity) {
                debug!(%entity, view = id, "entity left view");
                view.fire_exit(entity);
            }
        }
    }

    /// The store of `flag` moved an instance; fix every column that
    /// referenced it.
    pub fn relocate(&mut self, flag: ComponentFlag, relocation: Relocation) {
        for &id in self.by_type.get(flag.index()).into_iter().flatten() {
            let view = &mut self.views[id];
            if let Some(k) = view.column_of(flag) {
                view.relocate(k, relocation);
            }
        }
    }

    /// The store of `flag` was reordered; every view requiring it
    /// re-resolves that column.
    pub fn resolve(&mut self, flag: ComponentFlag, store: &ComponentStore) {
        for &id in self.by_type.get(flag.index()).into_iter().flatten() {
            let view = &mut self.views[id];
            if let Some(k) = view.column_of(flag) {
                view.resolve_column(k, store);
            }
        }
    }

    /// Rebuild a view's entity order from a snapshot, skipping entities
    /// that no longer satisfy it. Used only while restoring.
    pub(crate) fn restore_order(
        &mut self,
        id: ViewId,
        order: &[Entity],
        stores: &[ComponentStore],
    ) -> usize {
        let view = &mut self.views[id];
        view.entities.clear();
        view.positions.clear();
        for column in &mut view.columns {
            column.clear();
        }
        order
            .iter()
            .filter(|&&entity| view.push(entity, stores))
            .count()
    }
}
