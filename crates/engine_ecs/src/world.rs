//! The world: single owner of registry, entities, stores, views, systems
//! and the deferred mutation queue.
//!
//! Use is two-phase. Component types and systems are declared first and
//! only take effect at [`World::compile`]; declarations made after the
//! first compile are applied straight away.

use engine_component::{ComponentFlag, ComponentShape, Entity, Fields, Mask, into_fields};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::commands::{Mutation, MutationQueue};
use crate::config::WorldConfig;
use crate::context::{Row, SystemContext};
use crate::entities::EntityTable;
use crate::error::{WorldError, WorldResult};
use crate::events::{Event, EventBus, EventSink};
use crate::registry::{ComponentRegistry, Registration};
use crate::scheduler::{RegisteredSystem, SystemHooks, SystemScheduler};
use crate::store::ComponentStore;
use crate::time::Time;
use crate::view::{View, ViewCache, ViewHooks, ViewId};

type SetupFn = Box<dyn FnOnce() -> SystemHooks>;

struct StagedSystem {
    name: String,
    types: Vec<String>,
    setup: SetupFn,
}

/// Something that configures a world in one go: registers components,
/// systems, subscribers.
pub trait Plugin {
    fn install(self, world: &mut World) -> WorldResult<()>;
}

impl<F> Plugin for F
where
    F: FnOnce(&mut World) -> WorldResult<()>,
{
    fn install(self, world: &mut World) -> WorldResult<()> {
        self(world)
    }
}

pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) compiled: bool,
    staged_components: Vec<(String, ComponentShape)>,
    staged_systems: Vec<StagedSystem>,
    pub(crate) registry: ComponentRegistry,
    pub(crate) entities: EntityTable,
    /// Indexed by component flag.
    pub(crate) stores: Vec<ComponentStore>,
    pub(crate) views: ViewCache,
    pub(crate) scheduler: SystemScheduler,
    pub(crate) queue: MutationQueue,
    pub(crate) events: EventBus,
    pub(crate) time: Time,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("compiled", &self.compiled)
            .field("components", &self.registry.len())
            .field("entities", &self.entities.len())
            .field("views", &self.views.len())
            .field("systems", &self.scheduler.len())
            .field("pending", &self.queue.len())
            .field("time", &self.time)
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_config(WorldConfig::default())
    }

    pub fn with_config(config: WorldConfig) -> Self {
        Self {
            config,
            compiled: false,
            staged_components: Vec::new(),
            staged_systems: Vec::new(),
            registry: ComponentRegistry::new(),
            entities: EntityTable::new(),
            stores: Vec::new(),
            views: ViewCache::new(),
            scheduler: SystemScheduler::new(),
            queue: MutationQueue::new(),
            events: EventBus::new(),
            time: Time::default(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &SystemScheduler {
        &self.scheduler
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    /// Number of deferred mutations waiting for the next drain.
    pub fn pending_mutations(&self) -> usize {
        self.queue.len()
    }

    pub fn subscribe(&mut self, sink: impl EventSink + 'static) {
        self.events.subscribe(sink);
    }

    pub fn install(&mut self, plugin: impl Plugin) -> WorldResult<()> {
        plugin.install(self)
    }

    fn ensure_compiled(&self, operation: &'static str) -> WorldResult<()> {
        if self.compiled {
            Ok(())
        } else {
            Err(WorldError::NotCompiled { operation })
        }
    }

    // -- Declarations --

    /// Declare a component type with its default fields.
    ///
    /// Registering an existing name again replaces its shape and migrates
    /// every existing instance additively.
    ///
    /// # Errors
    ///
    /// Fails if `shape` is neither an object nor `null`.
    pub fn register_component(&mut self, name: &str, shape: Value) -> WorldResult<()> {
        let shape = ComponentShape::from_value(shape).map_err(|source| WorldError::InvalidPayload {
            component: name.to_string(),
            source,
        })?;
        if self.compiled {
            self.apply_registration(name, shape);
        } else {
            debug!(component = name, "component registration staged");
            self.staged_components.push((name.to_string(), shape));
        }
        Ok(())
    }

    /// Declare a system over `types`.
    ///
    /// `setup` runs once, when the system is bound, and returns its
    /// callbacks. A system registered under an existing name replaces that
    /// system without changing its place in the execution order.
    ///
    /// # Errors
    ///
    /// After compile, fails immediately on an invalid requirement list;
    /// before compile the same errors surface from [`compile`](Self::compile).
    pub fn register_system<S>(&mut self, name: &str, types: &[&str], setup: S) -> WorldResult<()>
    where
        S: FnOnce() -> SystemHooks + 'static,
    {
        let staged = StagedSystem {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            setup: Box::new(setup),
        };
        if self.compiled {
            self.bind_system(staged)
        } else {
            debug!(system = name, "system registration staged");
            self.staged_systems.push(staged);
            Ok(())
        }
    }

    /// Flush staged declarations: components first, in declaration order,
    /// then systems. Calling it again is harmless.
    ///
    /// # Errors
    ///
    /// Fails when a staged system names an unknown type or lists a type
    /// twice. Systems staged after the failing one stay staged.
    pub fn compile(&mut self) -> WorldResult<()> {
        for (name, shape) in std::mem::take(&mut self.staged_components) {
            self.apply_registration(&name, shape);
        }
        self.compiled = true;

        let mut staged = std::mem::take(&mut self.staged_systems).into_iter();
        while let Some(system) = staged.next() {
            if let Err(err) = self.bind_system(system) {
                self.staged_systems.extend(staged);
                return Err(err);
            }
        }

        info!(
            components = self.registry.len(),
            systems = self.scheduler.len(),
            views = self.views.len(),
            "world compiled"
        );
        Ok(())
    }

    fn apply_registration(&mut self, name: &str, shape: ComponentShape) {
        let registration = self.registry.register(name, shape.clone());
        let flag = registration.flag();
        match registration {
            Registration::New(_) => {
                self.stores.push(ComponentStore::new());
                debug!(component = name, %flag, "component registered");
            }
            Registration::Migrated(_) => {
                let touched = self.stores[flag.index()].migrate(&shape);
                info!(component = name, %flag, instances = touched, "component shape migrated");
            }
        }
        self.events.emit_with(|| Event::ComponentRegistered {
            name: name.to_string(),
            shape,
            flag,
        });
    }

    fn bind_system(&mut self, staged: StagedSystem) -> WorldResult<()> {
        let StagedSystem { name, types, setup } = staged;
        let context = format!("system '{name}'");
        let (flags, mask) = self.registry.resolve(&types, &context)?;
        let view_id = self
            .views
            .get_or_create(&flags, mask, &self.stores, &self.entities);
        let view = self
            .views
            .get_mut(view_id)
            .ok_or(WorldError::ViewNotFound(view_id))?;

        let order = flags
            .iter()
            .map(|&flag| view.column_of(flag))
            .collect::<Option<Vec<usize>>>()
            .ok_or_else(|| {
                WorldError::InvariantViolation(format!("view {view_id} lacks a column for {context}"))
            })?;

        let hooks = setup();
        view.detach(&name);
        if hooks.on_enter.is_some() || hooks.on_exit.is_some() {
            view.attach(ViewHooks {
                owner: name.clone(),
                on_enter: hooks.on_enter,
                on_exit: hooks.on_exit,
            });
        }

        let replaced = self.scheduler.insert(RegisteredSystem {
            name: name.clone(),
            types: types.clone(),
            flags,
            view: view_id,
            order,
            update: hooks.update,
        });
        if let Some(old) = replaced {
            if old.view != view_id {
                if let Some(old_view) = self.views.get_mut(old.view) {
                    old_view.detach(&name);
                }
            }
            info!(system = %name, view = view_id, "system replaced");
        } else {
            info!(system = %name, view = view_id, "system registered");
        }

        self.events.emit(Event::SystemRegistered { name, types });
        Ok(())
    }

    // -- Entity lifecycle --

    /// Allocate a fresh id. It is not live until [`add_entity`](Self::add_entity).
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.allocate();
        self.events.emit(Event::EntityCreated(entity));
        entity
    }

    /// Make `entity` live with no components. Adding a live entity again
    /// is a logged no-op.
    ///
    /// # Errors
    ///
    /// Only ids from [`create_entity`](Self::create_entity) are accepted.
    /// A removed id fails with [`WorldError::EntityRetired`]; any other
    /// unknown id with [`WorldError::EntityNotFound`].
    pub fn add_entity(&mut self, entity: Entity) -> WorldResult<()> {
        if !self.entities.admit(entity)? {
            warn!(%entity, "entity already live, ignoring add");
            return Ok(());
        }
        debug!(%entity, "entity added");
        self.events.emit(Event::EntityAdded(entity));
        Ok(())
    }

    /// [`create_entity`](Self::create_entity) followed by
    /// [`add_entity`](Self::add_entity).
    pub fn spawn(&mut self) -> Entity {
        let entity = self.create_entity();
        self.entities.insert(entity);
        self.events.emit(Event::EntityAdded(entity));
        entity
    }

    /// Remove `entity` and every component attached to it.
    ///
    /// Deferred removals queue one component removal per attached type
    /// followed by the entity record itself.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is not live.
    pub fn remove_entity(&mut self, entity: Entity, immediate: bool) -> WorldResult<()> {
        let mask = self.entities.require(entity)?;
        self.events.emit(Event::EntityRemoving(entity));

        if immediate {
            self.drop_entity(entity);
            return Ok(());
        }
        for flag in mask.flags() {
            self.queue.push(Mutation::RemoveComponent {
                entity,
                component: self.registry.name_of(flag).to_string(),
            });
        }
        self.queue.push(Mutation::RemoveEntity { entity });
        debug!(%entity, components = mask.count(), "entity removal queued");
        Ok(())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    pub fn mask(&self, entity: Entity) -> Option<&Mask> {
        self.entities.mask(entity)
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().map(|(entity, _)| entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Names of the component types attached to `entity`, in flag order.
    ///
    /// # Errors
    ///
    /// Fails if `entity` is not live.
    pub fn components_of(&self, entity: Entity) -> WorldResult<Vec<&str>> {
        let mask = self.entities.require(entity)?;
        Ok(self.registry.names_in(mask).collect())
    }

    fn drop_entity(&mut self, entity: Entity) {
        let Some(mask) = self.entities.mask(entity) else {
            warn!(%entity, "entity already removed");
            return;
        };
        let flags: Vec<ComponentFlag> = mask.flags().collect();
        for flag in flags {
            self.detach_component(entity, flag);
        }
        self.entities.remove(entity);
        debug!(%entity, "entity removed");
        self.events.emit(Event::EntityRemoved(entity));
    }

    // -- Component operations --

    /// Build a detached instance of `name` from its defaults and `values`.
    ///
    /// # Errors
    ///
    /// Fails before compile, for unregistered types and for non-object
    /// values.
    pub fn create_component(&mut self, name: &str, values: Value) -> WorldResult<Fields> {
        self.ensure_compiled("create_component")?;
        let flag = self.registry.require(name)?;
        let values = payload(name, values)?;
        let fields = self.instantiate(flag, &values);
        self.events.emit_with(|| Event::ComponentCreated {
            name: name.to_string(),
            fields: fields.clone(),
        });
        Ok(fields)
    }

    /// Attach `name` to `entity`, or merge `values` into the existing
    /// instance if it already has one.
    ///
    /// # Errors
    ///
    /// Fails before compile, for unregistered types, unknown entities and
    /// non-object values.
    pub fn add_component(&mut self, entity: Entity, name: &str, values: Value) -> WorldResult<()> {
        self.ensure_compiled("add_component")?;
        let values = payload(name, values)?;
        self.attach(entity, name, &values)
    }

    /// Queue an [`add_component`](Self::add_component) for the next drain.
    ///
    /// # Errors
    ///
    /// The same checks as `add_component`, made now rather than at drain.
    pub fn queue_add_component(&mut self, entity: Entity, name: &str, values: Value) -> WorldResult<()> {
        self.ensure_compiled("queue_add_component")?;
        self.registry.require(name)?;
        self.entities.require(entity)?;
        let values = payload(name, values)?;
        self.queue.push(Mutation::AddComponent {
            entity,
            component: name.to_string(),
            values,
        });
        Ok(())
    }

    /// Detach `name` from `entity`, now or at the next drain.
    ///
    /// A missing component is logged and ignored when the removal is
    /// applied.
    ///
    /// # Errors
    ///
    /// Fails before compile, for unregistered types and unknown entities.
    pub fn remove_component(&mut self, entity: Entity, name: &str, immediate: bool) -> WorldResult<()> {
        self.ensure_compiled("remove_component")?;
        let flag = self.registry.require(name)?;
        self.entities.require(entity)?;
        if immediate {
            self.detach_component(entity, flag);
        } else {
            debug!(%entity, component = name, "component removal queued");
            self.queue.push(Mutation::RemoveComponent {
                entity,
                component: name.to_string(),
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Fails for unregistered types, unknown entities, or when the entity
    /// does not have the component.
    pub fn get_component(&self, entity: Entity, name: &str) -> WorldResult<&Fields> {
        let flag = self.registry.require(name)?;
        self.entities.require(entity)?;
        self.stores[flag.index()]
            .get(entity)
            .map(|instance| &instance.fields)
            .ok_or_else(|| WorldError::ComponentNotFound(name.to_string(), entity))
    }

    pub fn has_component(&self, entity: Entity, name: &str) -> bool {
        match (self.registry.flag_of(name), self.entities.mask(entity)) {
            (Some(flag), Some(mask)) => mask.has(flag),
            _ => false,
        }
    }

    /// Overwrite the supplied fields of an existing instance. Defaults are
    /// never re-applied.
    ///
    /// # Errors
    ///
    /// Fails for unregistered types, unknown entities, missing components
    /// and non-object values.
    pub fn update_component(&mut self, entity: Entity, name: &str, values: Value) -> WorldResult<()> {
        let flag = self.registry.require(name)?;
        self.entities.require(entity)?;
        let values = payload(name, values)?;
        self.merge(entity, flag, &values)
    }

    fn instantiate(&self, flag: ComponentFlag, values: &Fields) -> Fields {
        let Some(shape) = self.registry.shape(flag) else {
            return Fields::new();
        };
        let (fields, ignored) = shape.instantiate(values);
        self.report_ignored(flag, &ignored);
        fields
    }

    fn report_ignored(&self, flag: ComponentFlag, ignored: &[String]) {
        if self.config.warn_unknown_fields && !ignored.is_empty() {
            warn!(
                component = self.registry.name_of(flag),
                fields = ?ignored,
                "ignoring undeclared fields"
            );
        }
    }

    fn attach(&mut self, entity: Entity, name: &str, values: &Fields) -> WorldResult<()> {
        let flag = self.registry.require(name)?;
        if self.entities.require(entity)?.has(flag) {
            return self.merge(entity, flag, values);
        }

        let fields = self.instantiate(flag, values);
        self.stores[flag.index()].insert(entity, fields);
        let mask = self.entities.set_flag(entity, flag)?;
        self.views.admit(entity, flag, mask, &self.stores);
        debug!(%entity, component = name, "component added");

        if let Some(instance) = self.stores[flag.index()].get(entity) {
            self.events.emit_with(|| Event::ComponentAdded {
                name: name.to_string(),
                instance: instance.clone(),
            });
        }
        Ok(())
    }

    fn merge(&mut self, entity: Entity, flag: ComponentFlag, values: &Fields) -> WorldResult<()> {
        let instance = self.stores[flag.index()].get_mut(entity).ok_or_else(|| {
            WorldError::ComponentNotFound(self.registry.name_of(flag).to_string(), entity)
        })?;
        let ignored = instance.merge(values);
        self.report_ignored(flag, &ignored);
        Ok(())
    }

    /// Evict, swap-remove, fix relocations, clear the flag. Returns whether
    /// anything was removed.
    fn detach_component(&mut self, entity: Entity, flag: ComponentFlag) -> bool {
        let name = self.registry.name_of(flag);
        if !self.stores[flag.index()].contains(entity) {
            warn!(%entity, component = name, "component not present, nothing to remove");
            return false;
        }

        self.views.evict(entity, flag);
        let Some((instance, moved)) = self.stores[flag.index()].remove(entity) else {
            return false;
        };
        if let Some(relocation) = moved {
            self.views.relocate(flag, relocation);
        }
        if let Err(err) = self.entities.clear_flag(entity, flag) {
            error!(%entity, component = name, %err, "component outlived its entity");
        }
        debug!(%entity, component = name, "component removed");

        self.events.emit_with(|| Event::ComponentRemoved {
            name: name.to_string(),
            instance,
        });
        true
    }

    // -- Views and queries --

    /// Return the shared view for `types`, building it on first use.
    ///
    /// # Errors
    ///
    /// Fails before compile, for unregistered types, and for empty or
    /// repeating type lists.
    pub fn create_view(&mut self, types: &[&str]) -> WorldResult<ViewId> {
        self.ensure_compiled("create_view")?;
        let (flags, mask) = self.registry.resolve(types, "view")?;
        Ok(self
            .views
            .get_or_create(&flags, mask, &self.stores, &self.entities))
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(id)
    }

    pub fn views(&self) -> &ViewCache {
        &self.views
    }

    /// Group the instances matching a view at the front of each of its
    /// stores. Every view over a reordered store re-resolves its slots, so
    /// iteration order is unchanged everywhere.
    ///
    /// # Errors
    ///
    /// Fails for an unknown view id.
    pub fn prioritize(&mut self, id: ViewId) -> WorldResult<()> {
        let view = self.views.get(id).ok_or(WorldError::ViewNotFound(id))?;
        let types = view.types().to_vec();
        let mask = view.mask().clone();

        for flag in types {
            let entities = &self.entities;
            let moved = self.stores[flag.index()].partition_by(|entity| {
                entities
                    .mask(entity)
                    .is_some_and(|current| current.contains_all(&mask))
            });
            if moved {
                self.views.resolve(flag, &self.stores[flag.index()]);
                debug!(view = id, %flag, "store reordered");
            }
        }
        Ok(())
    }

    /// Uncached lookup: entities having every type in `types`, in the
    /// store order of the first one.
    ///
    /// # Errors
    ///
    /// Same as [`create_view`](Self::create_view).
    pub fn query(&self, types: &[&str]) -> WorldResult<Vec<Entity>> {
        self.ensure_compiled("query")?;
        let (flags, mask) = self.registry.resolve(types, "query")?;
        let first = flags[0];
        Ok(self.stores[first.index()]
            .entities()
            .filter(|&entity| {
                self.entities
                    .mask(entity)
                    .is_some_and(|current| current.contains_all(&mask))
            })
            .collect())
    }

    // -- Ticking --

    /// Compile, announce `start` and take `now_ms` as the clock baseline.
    ///
    /// # Errors
    ///
    /// Whatever [`compile`](Self::compile) reports.
    pub fn start(&mut self, now_ms: f64) -> WorldResult<()> {
        self.compile()?;
        self.time.reset(now_ms);
        info!(tick = self.time.tick, "world started");
        self.events.emit(Event::Start);
        Ok(())
    }

    /// Advance to the clock reading `now_ms` and run one tick.
    ///
    /// # Errors
    ///
    /// Whatever [`process_tick`](Self::process_tick) reports.
    pub fn step(&mut self, now_ms: f64) -> WorldResult<()> {
        self.ensure_compiled("step")?;
        self.time.advance_to(now_ms);
        self.process_tick(self.time.delta)
    }

    /// Run every system over its view, then drain deferred mutations.
    ///
    /// Additions a system requests are applied as soon as it returns;
    /// removals wait until every system has run. Emits `update` and bumps
    /// the tick counter afterwards.
    ///
    /// # Errors
    ///
    /// Fails before compile, or when applying a mutation fails for a
    /// reason other than a vanished entity or component.
    pub fn process_tick(&mut self, delta: f64) -> WorldResult<()> {
        self.ensure_compiled("process_tick")?;
        self.time.delta = delta;

        let mut additions = Vec::new();
        for index in 0..self.scheduler.len() {
            self.run_system(index, &mut additions)?;
            for mutation in additions.drain(..) {
                self.apply_or_warn(mutation)?;
            }
        }

        self.flush()?;

        let Time { delta, tick, .. } = self.time;
        self.events.emit(Event::Update { delta, tick });
        self.time.tick += 1;
        Ok(())
    }

    fn run_system(&mut self, index: usize, additions: &mut Vec<Mutation>) -> WorldResult<()> {
        let World {
            registry,
            entities,
            stores,
            views,
            scheduler,
            queue,
            events,
            time,
            ..
        } = self;

        let Some(system) = scheduler.get_index_mut(index) else {
            return Ok(());
        };
        let view = views
            .get(system.view)
            .ok_or(WorldError::ViewNotFound(system.view))?;

        let mut ctx = SystemContext {
            time: *time,
            entities,
            registry,
            additions,
            queue,
            events,
        };
        for (i, &entity) in view.entities().iter().enumerate() {
            let mut row = Row {
                stores: stores.as_mut_slice(),
                view,
                order: &system.order,
                index: i,
                entity,
            };
            (system.update)(&mut row, &mut ctx);
        }
        Ok(())
    }

    /// Apply every queued mutation now, then run the invariant check if
    /// configured.
    ///
    /// # Errors
    ///
    /// Propagates mutation failures other than vanished entities or
    /// components, and invariant violations in release builds.
    pub fn flush(&mut self) -> WorldResult<()> {
        while !self.queue.is_empty() {
            for mutation in self.queue.take() {
                self.apply_or_warn(mutation)?;
            }
        }
        if self.config.check_invariants {
            if let Err(err) = self.check_invariants() {
                if cfg!(debug_assertions) {
                    panic!("{err}");
                }
                error!(%err, "world invariants broken after drain");
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply_or_warn(&mut self, mutation: Mutation) -> WorldResult<()> {
        match self.apply(mutation) {
            Err(err) if err.is_not_found() => {
                warn!(%err, "skipping deferred mutation");
                Ok(())
            }
            other => other,
        }
    }

    fn apply(&mut self, mutation: Mutation) -> WorldResult<()> {
        match mutation {
            Mutation::AddComponent {
                entity,
                component,
                values,
            } => self.attach(entity, &component, &values),
            Mutation::RemoveComponent { entity, component } => {
                let flag = self.registry.require(&component)?;
                self.entities.require(entity)?;
                self.detach_component(entity, flag);
                Ok(())
            }
            Mutation::RemoveEntity { entity } => {
                self.drop_entity(entity);
                Ok(())
            }
        }
    }

    // -- Invariants --

    /// Verify mask consistency, store indexing and the alignment and
    /// completeness of every view.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvariantViolation`] describing the first
    /// broken invariant.
    pub fn check_invariants(&self) -> WorldResult<()> {
        for (entity, mask) in self.entities.iter() {
            let expected: Mask = self
                .registry
                .iter()
                .map(|ty| ty.flag)
                .filter(|flag| self.stores[flag.index()].contains(entity))
                .collect();
            if &expected != mask {
                return Err(violation(format!(
                    "mask of {entity} is {:?} but its stores say {:?}",
                    mask.flags().collect::<Vec<_>>(),
                    expected.flags().collect::<Vec<_>>()
                )));
            }
        }

        for ty in self.registry.iter() {
            let store = &self.stores[ty.flag.index()];
            for (slot, instance) in store.iter().enumerate() {
                if !self.entities.contains(instance.entity) {
                    return Err(violation(format!(
                        "'{}' instance at slot {slot} belongs to dead {}",
                        ty.name, instance.entity
                    )));
                }
                if store.slot_of(instance.entity) != Some(slot) {
                    return Err(violation(format!(
                        "'{}' index of {} does not point at slot {slot}",
                        ty.name, instance.entity
                    )));
                }
            }
        }

        for (id, view) in self.views.iter() {
            self.check_view(id, view)?;
        }
        Ok(())
    }

    fn check_view(&self, id: ViewId, view: &View) -> WorldResult<()> {
        for (k, flag) in view.types().iter().enumerate() {
            if view.column(k).len() != view.len() {
                return Err(violation(format!("view {id} column {k} has the wrong length")));
            }
            let store = &self.stores[flag.index()];
            for (i, &entity) in view.entities().iter().enumerate() {
                let slot = view.column(k)[i];
                if slot >= store.len() || store.at(slot).entity != entity {
                    return Err(violation(format!(
                        "view {id} row {i} ({entity}) misaligned in column '{}'",
                        self.registry.name_of(*flag)
                    )));
                }
            }
        }

        for (i, &entity) in view.entities().iter().enumerate() {
            if view.position(entity) != Some(i) {
                return Err(violation(format!("view {id} position of {entity} is stale")));
            }
        }

        let matching = self
            .entities
            .iter()
            .filter(|(_, mask)| mask.contains_all(view.mask()))
            .map(|(entity, _)| entity);
        let mut expected = 0;
        for entity in matching {
            expected += 1;
            if !view.contains(entity) {
                return Err(violation(format!("view {id} is missing {entity}")));
            }
        }
        if expected != view.len() {
            return Err(violation(format!(
                "view {id} holds {} entities, {expected} match",
                view.len()
            )));
        }
        Ok(())
    }
}

fn payload(component: &str, values: Value) -> WorldResult<Fields> {
    into_fields(values).map_err(|source| WorldError::InvalidPayload {
        component: component.to_string(),
        source,
    })
}

fn violation(message: String) -> WorldError {
    WorldError::InvariantViolation(message)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    type Seen = Rc<RefCell<Vec<(String, Entity)>>>;

    fn make_test_world() -> World {
        let mut world = World::new();
        world
            .register_component("position", json!({"x": 0, "y": 0}))
            .unwrap();
        world
            .register_component("velocity", json!({"dx": 0, "dy": 0}))
            .unwrap();
        world
    }

    /// A system that records every entity it visits as `(name, entity)`.
    fn recorder(world: &mut World, name: &str, types: &[&str], seen: &Seen) {
        let seen = seen.clone();
        let label = name.to_string();
        world
            .register_system(name, types, move || {
                SystemHooks::new(move |row, _| {
                    seen.borrow_mut().push((label.clone(), row.entity()));
                })
            })
            .unwrap();
    }

    fn entry(name: &str, entity: Entity) -> (String, Entity) {
        (name.to_string(), entity)
    }

    #[test]
    fn test_defaults_merged_with_overrides() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.create_entity();
        world.add_entity(e).unwrap();
        world.add_component(e, "position", json!({"x": 5})).unwrap();

        let position = world.get_component(e, "position").unwrap();
        assert_eq!(Value::Object(position.clone()), json!({"x": 5, "y": 0}));
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_second_add_merges() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "position", json!({"x": 1})).unwrap();
        world.add_component(e, "position", json!({"y": 2})).unwrap();
        world.add_component(e, "position", json!({"x": 3})).unwrap();

        assert_eq!(world.stores[0].len(), 1);
        let position = world.get_component(e, "position").unwrap();
        assert_eq!(Value::Object(position.clone()), json!({"x": 3, "y": 2}));
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_update_never_reapplies_defaults() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "position", json!({"x": 1, "y": 1})).unwrap();
        world.update_component(e, "position", json!({"y": 9})).unwrap();
        let position = world.get_component(e, "position").unwrap();
        assert_eq!(Value::Object(position.clone()), json!({"x": 1, "y": 9}));

        let err = world.update_component(e, "velocity", json!({})).unwrap_err();
        assert!(matches!(err, WorldError::ComponentNotFound(..)));
    }

    #[test]
    fn test_reregistration_migrates_instances() {
        let mut world = World::new();
        world.register_component("stats", json!({"a": 0})).unwrap();
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "stats", json!({"a": 7})).unwrap();

        world.register_component("stats", json!({"a": 0, "b": 1})).unwrap();
        let stats = world.get_component(e, "stats").unwrap();
        assert_eq!(Value::Object(stats.clone()), json!({"a": 7, "b": 1}));
        assert_eq!(world.registry().len(), 1);
    }

    #[test]
    fn test_use_before_compile_is_a_lifecycle_error() {
        let mut world = make_test_world();
        let e = world.spawn();

        let err = world.add_component(e, "position", json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);
        assert!(err.is_configuration());
        assert!(world.create_component("position", json!({})).is_err());
        assert!(world.create_view(&["position"]).is_err());
        assert!(world.process_tick(0.0).is_err());
    }

    #[test]
    fn test_configuration_and_not_found_errors() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.spawn();

        let err = world.add_component(e, "mass", json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = world.add_component(Entity(404), "position", json!({})).unwrap_err();
        assert!(err.is_not_found());

        let err = world.add_component(e, "position", json!([1, 2])).unwrap_err();
        assert!(matches!(err, WorldError::InvalidPayload { .. }));

        assert!(world.remove_entity(Entity(404), false).unwrap_err().is_not_found());
        assert!(world.create_view(&["position", "position"]).is_err());
    }

    #[test]
    fn test_created_entity_is_not_live_until_added() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.create_entity();
        assert!(!world.contains(e));
        assert!(world.add_component(e, "position", json!({})).unwrap_err().is_not_found());
        world.add_entity(e).unwrap();
        world.add_entity(e).unwrap();
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn test_add_entity_rejects_removed_and_foreign_ids() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();
        world.remove_entity(e, true).unwrap();

        let err = world.add_entity(e).unwrap_err();
        assert!(matches!(err, WorldError::EntityRetired(id) if id == e));
        assert!(err.is_not_found());
        assert!(!world.contains(e));

        let err = world.add_entity(Entity(999)).unwrap_err();
        assert!(matches!(err, WorldError::EntityNotFound(Entity(999))));
        assert_eq!(world.create_entity(), Entity(2));
        assert_eq!(world.entity_count(), 0);
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_removing_missing_component_is_harmless() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();

        world.remove_component(e, "velocity", true).unwrap();
        world.remove_component(e, "velocity", false).unwrap();
        world.flush().unwrap();
        assert!(world.has_component(e, "position"));
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_view_order_follows_first_type_store() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let a = world.spawn();
        let b = world.spawn();
        world.add_component(b, "velocity", json!({})).unwrap();
        world.add_component(a, "velocity", json!({})).unwrap();
        world.add_component(a, "position", json!({})).unwrap();
        world.add_component(b, "position", json!({})).unwrap();

        let by_velocity = world.create_view(&["velocity", "position"]).unwrap();
        assert_eq!(world.view(by_velocity).unwrap().entities(), &[b, a]);

        // Same set in another order shares the view.
        let shared = world.create_view(&["position", "velocity"]).unwrap();
        assert_eq!(shared, by_velocity);

        assert_eq!(world.query(&["position", "velocity"]).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_both_systems_see_component_added_before_tick() {
        let mut world = make_test_world();
        let seen: Seen = Rc::default();
        recorder(&mut world, "system1", &["position"], &seen);
        recorder(&mut world, "system2", &["position", "velocity"], &seen);
        world.compile().unwrap();

        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();
        world.add_component(e, "velocity", json!({})).unwrap();
        world.process_tick(0.05).unwrap();

        assert_eq!(*seen.borrow(), vec![entry("system1", e), entry("system2", e)]);
    }

    #[test]
    fn test_removal_mid_tick_is_deferred() {
        let mut world = make_test_world();
        world
            .register_system("system1", &["position"], || {
                SystemHooks::new(|row, ctx| {
                    ctx.remove_component(row.entity(), "velocity").unwrap();
                })
            })
            .unwrap();
        let seen: Seen = Rc::default();
        recorder(&mut world, "system2", &["position", "velocity"], &seen);
        world.compile().unwrap();

        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();
        world.add_component(e, "velocity", json!({})).unwrap();

        world.process_tick(0.05).unwrap();
        assert_eq!(*seen.borrow(), vec![entry("system2", e)]);
        assert!(!world.has_component(e, "velocity"));

        world.process_tick(0.05).unwrap();
        assert_eq!(seen.borrow().len(), 1);
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_additions_visible_to_later_systems_same_tick() {
        let mut world = make_test_world();
        world
            .register_system("spawner", &["position"], || {
                SystemHooks::new(|row, ctx| {
                    ctx.add_component(row.entity(), "velocity", json!({"dx": 1})).unwrap();
                    if ctx.tick() == 0 {
                        let child = ctx.create_entity();
                        ctx.add_component(child, "velocity", json!({})).unwrap();
                        ctx.add_component(child, "position", json!({})).unwrap();
                    }
                })
            })
            .unwrap();
        let seen: Seen = Rc::default();
        recorder(&mut world, "mover", &["velocity", "position"], &seen);
        world.compile().unwrap();

        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();
        world.process_tick(0.05).unwrap();

        let child = Entity(e.id() + 1);
        assert_eq!(*seen.borrow(), vec![entry("mover", e), entry("mover", child)]);
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_systems_receive_declared_order_and_can_write() {
        let mut world = make_test_world();
        world
            .register_system("movement", &["velocity", "position"], || {
                SystemHooks::new(|row, ctx| {
                    let dx = row.number(0, "dx").unwrap_or(0.0);
                    let x = row.number(1, "x").unwrap_or(0.0);
                    row.set_field(1, "x", x + dx * ctx.delta());
                })
            })
            .unwrap();
        world.compile().unwrap();
        // A view over the same set created in the other order is shared.
        world.create_view(&["position", "velocity"]).unwrap();

        let e = world.spawn();
        world.add_component(e, "position", json!({"x": 1.0})).unwrap();
        world.add_component(e, "velocity", json!({"dx": 10.0})).unwrap();
        world.process_tick(0.5).unwrap();

        assert_eq!(world.get_component(e, "position").unwrap()["x"], json!(6.0));
    }

    #[test]
    fn test_remove_entity_cascades() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let both = world.create_view(&["position", "velocity"]).unwrap();
        let a = world.spawn();
        let b = world.spawn();
        for e in [a, b] {
            world.add_component(e, "position", json!({})).unwrap();
            world.add_component(e, "velocity", json!({})).unwrap();
        }

        world.remove_entity(a, false).unwrap();
        assert_eq!(world.pending_mutations(), 3);
        assert!(world.contains(a));
        world.flush().unwrap();
        assert!(!world.contains(a));
        assert_eq!(world.view(both).unwrap().entities(), &[b]);

        world.remove_entity(b, true).unwrap();
        assert!(world.view(both).unwrap().is_empty());
        assert!(world.stores.iter().all(ComponentStore::is_empty));
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_queued_add_applies_on_flush() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.spawn();
        world.queue_add_component(e, "position", json!({"x": 2})).unwrap();
        assert!(!world.has_component(e, "position"));
        world.flush().unwrap();
        assert_eq!(world.components_of(e).unwrap(), vec!["position"]);
    }

    #[test]
    fn test_deferred_ops_on_vanished_entity_are_skipped() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();
        world.remove_component(e, "position", false).unwrap();
        world.queue_add_component(e, "velocity", json!({})).unwrap();
        world.remove_entity(e, true).unwrap();
        world.flush().unwrap();
        assert!(!world.contains(e));
    }

    #[test]
    fn test_replacing_a_system_keeps_its_slot() {
        let mut world = make_test_world();
        let seen: Seen = Rc::default();
        recorder(&mut world, "first", &["position"], &seen);
        recorder(&mut world, "second", &["position"], &seen);
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();

        let swapped = seen.clone();
        world
            .register_system("first", &["position"], move || {
                SystemHooks::new(move |row, _| {
                    swapped.borrow_mut().push(entry("first-v2", row.entity()));
                })
            })
            .unwrap();
        world.process_tick(0.0).unwrap();

        assert_eq!(world.scheduler().len(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![entry("first-v2", e), entry("second", e)]
        );
    }

    #[test]
    fn test_enter_and_exit_hooks() {
        let mut world = make_test_world();
        let log: Seen = Rc::default();
        let (enter, exit) = (log.clone(), log.clone());
        world
            .register_system("watch", &["position", "velocity"], move || {
                SystemHooks::new(|_, _| {})
                    .on_enter(move |e| enter.borrow_mut().push(entry("enter", e)))
                    .on_exit(move |e| exit.borrow_mut().push(entry("exit", e)))
            })
            .unwrap();
        world.compile().unwrap();

        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();
        assert!(log.borrow().is_empty());
        world.add_component(e, "velocity", json!({})).unwrap();
        world.remove_component(e, "position", true).unwrap();
        assert_eq!(*log.borrow(), vec![entry("enter", e), entry("exit", e)]);

        // Replacing the system drops the old hooks.
        world
            .register_system("watch", &["position", "velocity"], || SystemHooks::new(|_, _| {}))
            .unwrap();
        world.add_component(e, "position", json!({})).unwrap();
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_setup_runs_once_at_bind() {
        let mut world = make_test_world();
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        world
            .register_system("counted", &["position"], move || {
                *counter.borrow_mut() += 1;
                SystemHooks::new(|_, _| {})
            })
            .unwrap();
        assert_eq!(*calls.borrow(), 0);
        world.compile().unwrap();
        world.compile().unwrap();
        world.process_tick(0.0).unwrap();
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_compile_reports_bad_system_requirements() {
        let mut world = make_test_world();
        world
            .register_system("broken", &["position", "mass"], || SystemHooks::new(|_, _| {}))
            .unwrap();
        let err = world.compile().unwrap_err();
        assert!(matches!(err, WorldError::UnregisteredComponent(ref n) if n == "mass"));
        assert!(world.is_compiled());
        assert!(world.scheduler().is_empty());
    }

    #[test]
    fn test_prioritize_keeps_every_view_aligned() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let positions = world.create_view(&["position"]).unwrap();
        let both = world.create_view(&["position", "velocity"]).unwrap();
        let es: Vec<Entity> = (0..6).map(|_| world.spawn()).collect();
        for (i, &e) in es.iter().enumerate() {
            world.add_component(e, "position", json!({"x": i})).unwrap();
            if i % 2 == 1 {
                world.add_component(e, "velocity", json!({})).unwrap();
            }
        }
        let before: Vec<Entity> = world.view(positions).unwrap().entities().to_vec();

        world.prioritize(both).unwrap();

        let front: Vec<Entity> = world.stores[0].entities().take(3).collect();
        assert_eq!(front, vec![es[1], es[3], es[5]]);
        assert_eq!(world.view(positions).unwrap().entities(), &before[..]);
        world.check_invariants().unwrap();
        assert!(world.prioritize(99).unwrap_err().is_not_found());
    }

    #[test]
    fn test_forty_component_types() {
        let mut world = World::new();
        for i in 0..40 {
            world.register_component(&format!("c{i}"), json!({"v": i})).unwrap();
        }
        world.compile().unwrap();
        let last = world.registry().flag_of("c39").unwrap();
        assert_eq!(last, ComponentFlag(39));

        let e = world.spawn();
        world.add_component(e, "c39", json!({})).unwrap();
        world.add_component(e, "c0", json!({})).unwrap();
        let only_high = world.create_view(&["c39"]).unwrap();
        let low = world.create_view(&["c7"]).unwrap();
        assert_eq!(world.view(only_high).unwrap().entities(), &[e]);
        assert!(world.view(low).unwrap().is_empty());
        assert_eq!(world.components_of(e).unwrap(), vec!["c0", "c39"]);
        world.check_invariants().unwrap();
    }

    #[test]
    fn test_alignment_survives_churn() {
        let mut world = World::new();
        let names = ["a", "b", "c", "d"];
        for name in names {
            world.register_component(name, json!({"n": 0})).unwrap();
        }
        world.compile().unwrap();
        for types in [&["a"][..], &["a", "b"][..], &["b", "c", "d"][..], &["d", "a"][..]] {
            world.create_view(types).unwrap();
        }
        let es: Vec<Entity> = (0..24).map(|_| world.spawn()).collect();

        // Deterministic LCG so the sequence is identical on every run.
        let mut state: u64 = 0x2545_f491;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 33) as usize
        };
        for _ in 0..400 {
            let e = es[next() % es.len()];
            let name = names[next() % names.len()];
            if next() % 3 == 0 {
                world.remove_component(e, name, true).unwrap();
            } else {
                world.add_component(e, name, json!({"n": 1})).unwrap();
            }
            world.check_invariants().unwrap();
        }
    }

    /// Four overlapping systems over a world churned by a seeded LCG, with
    /// deferred removals and a tick every 20 mutations.
    fn churned_world(seed: u64) -> (World, Seen) {
        let mut world = World::new();
        let names = ["a", "b", "c", "d"];
        for name in names {
            world.register_component(name, json!({"n": 0})).unwrap();
        }
        let seen: Seen = Rc::new(RefCell::new(Vec::new()));
        recorder(&mut world, "just_a", &["a"], &seen);
        recorder(&mut world, "a_b", &["a", "b"], &seen);
        recorder(&mut world, "b_c_d", &["b", "c", "d"], &seen);
        recorder(&mut world, "d_a", &["d", "a"], &seen);
        world.compile().unwrap();
        let es: Vec<Entity> = (0..24).map(|_| world.spawn()).collect();

        let mut state = seed;
        let mut next = move || {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (state >> 33) as usize
        };
        for step in 0..300 {
            let e = es[next() % es.len()];
            let name = names[next() % names.len()];
            if next() % 3 == 0 {
                world.remove_component(e, name, false).unwrap();
            } else {
                world.add_component(e, name, json!({"n": step})).unwrap();
            }
            if step % 20 == 19 {
                world.process_tick(0.05).unwrap();
            }
        }
        world.process_tick(0.05).unwrap();
        (world, seen)
    }

    #[test]
    fn test_identical_histories_give_identical_worlds() {
        let (first, first_seen) = churned_world(0x2545_f491);
        let (second, second_seen) = churned_world(0x2545_f491);

        assert_eq!(first.snapshot(), second.snapshot());
        assert!(!first_seen.borrow().is_empty());
        assert_eq!(*first_seen.borrow(), *second_seen.borrow());
        for ((_, a), (_, b)) in first.views().iter().zip(second.views().iter()) {
            assert_eq!(a.entities(), b.entities());
        }
        first.check_invariants().unwrap();
    }

    #[test]
    fn test_step_computes_delta_and_emits_events() {
        let mut world = make_test_world();
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        world.subscribe(move |event: &Event| {
            if let Event::Update { delta, tick } = event {
                sink.borrow_mut().push(format!("update {delta} {tick}"));
            } else {
                sink.borrow_mut().push(event.name().to_string());
            }
        });

        world.start(1_000.0).unwrap();
        world.step(1_250.0).unwrap();
        world.step(1_750.0).unwrap();

        assert_eq!(world.time().tick, 2);
        let log = events.borrow();
        assert_eq!(&log[log.len() - 3..], &["start", "update 0.25 0", "update 0.5 1"]);
    }

    #[test]
    fn test_entity_removal_events_in_order() {
        let mut world = make_test_world();
        let names = Rc::new(RefCell::new(Vec::new()));
        let sink = names.clone();
        world.subscribe(move |event: &Event| sink.borrow_mut().push(event.name()));
        world.compile().unwrap();
        let e = world.spawn();
        world.add_component(e, "position", json!({})).unwrap();
        names.borrow_mut().clear();

        world.remove_entity(e, false).unwrap();
        world.flush().unwrap();
        assert_eq!(
            *names.borrow(),
            vec!["entity-removed::before", "component-removed", "entity-removed"]
        );
    }

    #[test]
    fn test_create_component_is_detached() {
        let mut world = make_test_world();
        world.compile().unwrap();
        let fields = world.create_component("velocity", json!({"dx": 3})).unwrap();
        assert_eq!(Value::Object(fields), json!({"dx": 3, "dy": 0}));
        assert!(world.stores[1].is_empty());
    }

    #[test]
    fn test_install_plugin() {
        let mut world = World::new();
        world
            .install(|w: &mut World| {
                w.register_component("tag", Value::Null)?;
                w.register_system("tagged", &["tag"], || SystemHooks::new(|_, _| {}))
            })
            .unwrap();
        world.compile().unwrap();
        assert_eq!(world.scheduler().len(), 1);
    }
}
