use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use super::component::{CardUse, ComponentId, InjectionKind, Lifetime, SharedComponent};
use super::entity::EntityId;
use super::field::Field;

/// Clock facts that decide which pooled components run this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PoolGate {
    pub battle_step_elapsed: f64,
    pub battle_step_running: bool,
    pub mob_cleared: bool,
}

impl PoolGate {
    fn admits(&self, lifetime: Lifetime) -> bool {
        match lifetime {
            Lifetime::Local => false,
            Lifetime::Ui => self.battle_step_elapsed > 0.0,
            Lifetime::BattleStep => self.mob_cleared || self.battle_step_running,
        }
    }
}

/// Harvests components attached to field entities into the scene's update and draw pools.
///
/// A per-entity ledger holds the newest component id already processed, so each component
/// is offered to the scene at most once.
#[derive(Debug, Default)]
pub struct InjectionPipeline {
    ledger: HashMap<EntityId, ComponentId>,
    update_pool: Vec<SharedComponent>,
    draw_pool: Vec<SharedComponent>,
    publishers: Vec<SharedComponent>,
}

impl InjectionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks every entity's components newest to oldest, stopping at the ledger mark.
    /// Returns how many components were injected.
    pub fn process_newest(&mut self, field: &Field) -> usize {
        let mut injected = 0;
        for id in field.entity_ids() {
            let Some(entity) = field.entity(id) else {
                continue;
            };
            let Some(newest) = entity.newest_component_id() else {
                continue;
            };
            let processed = self.ledger.get(&id).copied().unwrap_or_default();
            if newest <= processed {
                continue;
            }

            let fresh: Vec<SharedComponent> = entity
                .components()
                .iter()
                .take_while(|component| component.borrow().id() > processed)
                .filter(|component| component.borrow().lifetime() != Lifetime::Local)
                .cloned()
                .collect();
            for component in fresh {
                if self.inject(component) {
                    injected += 1;
                }
            }
            self.ledger.insert(id, newest);
        }
        injected
    }

    /// Pools `component` according to its injection kind. Returns `false` when it is kept off
    /// the scene or already pooled.
    pub fn inject(&mut self, component: SharedComponent) -> bool {
        if self.is_pooled(&component) {
            return false;
        }
        let (kind, id, owner, drawable) = {
            let borrowed = component.borrow();
            (
                borrowed.injection(),
                borrowed.id(),
                borrowed.owner(),
                borrowed.as_draw_node().is_some(),
            )
        };
        match kind {
            InjectionKind::Detached => return false,
            InjectionKind::HealthOverlay => {
                self.update_pool.push(component.clone());
                self.draw_pool.push(component.clone());
            }
            InjectionKind::CardUsePublisher => self.publishers.push(component.clone()),
            InjectionKind::Generic => {
                self.update_pool.push(component.clone());
                if drawable {
                    self.draw_pool.push(component.clone());
                }
            }
        }
        component.borrow_mut().base_mut().set_scene_bound(true);
        debug!(component = id.0, entity = owner.0, ?kind, "component_injected");
        true
    }

    /// Drops the component from every pool and subscription and clears its scene binding.
    pub fn eject(&mut self, id: ComponentId) -> bool {
        let mut ejected = Vec::new();
        for pool in [
            &mut self.update_pool,
            &mut self.draw_pool,
            &mut self.publishers,
        ] {
            pool.retain(|component| {
                if component.borrow().id() == id {
                    ejected.push(component.clone());
                    false
                } else {
                    true
                }
            });
        }
        for component in &ejected {
            component.borrow_mut().base_mut().set_scene_bound(false);
        }
        if !ejected.is_empty() {
            debug!(component = id.0, "component_ejected");
        }
        !ejected.is_empty()
    }

    /// Ejects everything `owner` contributed and forgets its ledger entry.
    pub fn eject_owned_by(&mut self, owner: EntityId) -> usize {
        let ids: Vec<ComponentId> = self
            .update_pool
            .iter()
            .chain(&self.draw_pool)
            .chain(&self.publishers)
            .filter(|component| component.borrow().owner() == owner)
            .map(|component| component.borrow().id())
            .collect();
        let mut count = 0;
        for id in ids {
            if self.eject(id) {
                count += 1;
            }
        }
        self.ledger.remove(&owner);
        count
    }

    pub fn update_pool(&self, elapsed: f64, field: &mut Field, gate: PoolGate) {
        let due: Vec<SharedComponent> = self
            .update_pool
            .iter()
            .filter(|component| gate.admits(component.borrow().lifetime()))
            .cloned()
            .collect();
        for component in due {
            component.borrow_mut().update(elapsed, field);
        }
    }

    /// Card uses published since the last drain, in subscription order.
    pub fn drain_card_uses(&self) -> Vec<CardUse> {
        let mut uses = Vec::new();
        for publisher in &self.publishers {
            let mut borrowed = publisher.borrow_mut();
            if let Some(publisher) = borrowed.as_card_publisher() {
                uses.extend(publisher.drain_card_uses());
            }
        }
        uses
    }

    pub fn draw_pool(&self) -> &[SharedComponent] {
        &self.draw_pool
    }

    pub fn update_pool_len(&self) -> usize {
        self.update_pool.len()
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn ledger_mark(&self, entity: EntityId) -> Option<ComponentId> {
        self.ledger.get(&entity).copied()
    }

    fn is_pooled(&self, component: &SharedComponent) -> bool {
        self.update_pool
            .iter()
            .chain(&self.draw_pool)
            .chain(&self.publishers)
            .any(|pooled| Rc::ptr_eq(pooled, component))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::component::{CardUsePublisher, Component, ComponentBase, DrawNode};
    use crate::battle::entity::{Controller, Entity};
    use crate::battle::field::TilePos;
    use crate::render::{DrawSurface, Vec2};

    #[derive(Debug)]
    struct Probe {
        base: ComponentBase,
        kind: InjectionKind,
        drawable: bool,
        updates: u32,
        queued: Vec<CardUse>,
    }

    impl Probe {
        fn new(base: ComponentBase, kind: InjectionKind) -> Self {
            Self {
                base,
                kind,
                drawable: false,
                updates: 0,
                queued: Vec::new(),
            }
        }
    }

    impl DrawNode for Probe {
        fn draw(&self, _field: &Field, _view_offset: Vec2, _surface: &mut dyn DrawSurface) {}
    }

    impl CardUsePublisher for Probe {
        fn drain_card_uses(&mut self) -> Vec<CardUse> {
            std::mem::take(&mut self.queued)
        }
    }

    impl Component for Probe {
        fn base(&self) -> &ComponentBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut ComponentBase {
            &mut self.base
        }

        fn update(&mut self, _elapsed: f64, _field: &mut Field) {
            self.updates += 1;
        }

        fn injection(&self) -> InjectionKind {
            self.kind
        }

        fn as_draw_node(&self) -> Option<&dyn DrawNode> {
            self.drawable.then_some(self as &dyn DrawNode)
        }

        fn as_card_publisher(&mut self) -> Option<&mut dyn CardUsePublisher> {
            Some(self)
        }
    }

    fn field_with_player() -> (Field, EntityId) {
        let mut field = Field::new();
        let id = field
            .spawn(Entity::character("Mega", 100, Controller::Player), TilePos::new(2, 2))
            .expect("spawn");
        (field, id)
    }

    #[test]
    fn ledger_never_reprocesses_components() {
        let (mut field, player) = field_with_player();
        let mut pipeline = InjectionPipeline::new();
        let first = field
            .attach_component(player, Lifetime::Ui, |base| Probe::new(base, InjectionKind::Generic))
            .expect("attach");

        assert_eq!(pipeline.process_newest(&field), 1);
        assert_eq!(pipeline.process_newest(&field), 0);
        assert!(first.borrow().base().is_scene_bound());

        field
            .attach_component(player, Lifetime::BattleStep, |base| {
                Probe::new(base, InjectionKind::Generic)
            })
            .expect("attach");
        assert_eq!(pipeline.process_newest(&field), 1);
        assert_eq!(pipeline.update_pool_len(), 2);
        let newest = field.entity(player).and_then(Entity::newest_component_id);
        assert_eq!(pipeline.ledger_mark(player), newest);
        assert_eq!(pipeline.process_newest(&field), 0);
    }

    #[test]
    fn dispatch_follows_the_injection_kind() {
        let (mut field, player) = field_with_player();
        let mut pipeline = InjectionPipeline::new();
        field
            .attach_component(player, Lifetime::Local, |base| Probe::new(base, InjectionKind::Generic))
            .expect("attach");
        field
            .attach_component(player, Lifetime::Ui, |base| Probe::new(base, InjectionKind::Detached))
            .expect("attach");
        field
            .attach_component(player, Lifetime::Ui, |base| {
                Probe::new(base, InjectionKind::HealthOverlay)
            })
            .expect("attach");
        field
            .attach_component(player, Lifetime::Ui, |base| {
                Probe::new(base, InjectionKind::CardUsePublisher)
            })
            .expect("attach");
        field
            .attach_component(player, Lifetime::Ui, |base| Probe {
                drawable: true,
                ..Probe::new(base, InjectionKind::Generic)
            })
            .expect("attach");

        assert_eq!(pipeline.process_newest(&field), 3);
        assert_eq!(pipeline.update_pool_len(), 2);
        assert_eq!(pipeline.draw_pool().len(), 2);
        assert_eq!(pipeline.publisher_count(), 1);
    }

    #[test]
    fn pooled_updates_respect_lifetimes() {
        let (mut field, player) = field_with_player();
        let mut pipeline = InjectionPipeline::new();
        let ui = field
            .attach_component(player, Lifetime::Ui, |base| Probe::new(base, InjectionKind::Generic))
            .expect("attach");
        let step = field
            .attach_component(player, Lifetime::BattleStep, |base| {
                Probe::new(base, InjectionKind::Generic)
            })
            .expect("attach");
        pipeline.process_newest(&field);

        pipeline.update_pool(0.1, &mut field, PoolGate::default());
        assert_eq!((ui.borrow().updates, step.borrow().updates), (0, 0));

        let running = PoolGate {
            battle_step_elapsed: 0.1,
            battle_step_running: true,
            mob_cleared: false,
        };
        pipeline.update_pool(0.1, &mut field, running);
        assert_eq!((ui.borrow().updates, step.borrow().updates), (1, 1));

        let paused = PoolGate {
            battle_step_running: false,
            ..running
        };
        pipeline.update_pool(0.1, &mut field, paused);
        assert_eq!((ui.borrow().updates, step.borrow().updates), (2, 1));

        let cleared = PoolGate {
            mob_cleared: true,
            ..paused
        };
        pipeline.update_pool(0.1, &mut field, cleared);
        assert_eq!(step.borrow().updates, 2);
    }

    #[test]
    fn eject_removes_from_pools_and_unbinds() {
        let (mut field, player) = field_with_player();
        let mut pipeline = InjectionPipeline::new();
        let publisher = field
            .attach_component(player, Lifetime::Ui, |base| {
                Probe::new(base, InjectionKind::CardUsePublisher)
            })
            .expect("attach");
        pipeline.process_newest(&field);
        publisher.borrow_mut().queued.push(CardUse {
            actor: player,
            card: "Cannon".to_string(),
            damage: 40,
        });
        assert_eq!(pipeline.drain_card_uses().len(), 1);
        assert!(pipeline.drain_card_uses().is_empty());

        let id = publisher.borrow().id();
        assert!(pipeline.eject(id));
        assert!(!publisher.borrow().base().is_scene_bound());
        assert_eq!(pipeline.publisher_count(), 0);
        assert!(!pipeline.eject(id));
    }

    #[test]
    fn removed_owner_is_forgotten() {
        let (mut field, player) = field_with_player();
        let mut pipeline = InjectionPipeline::new();
        field
            .attach_component(player, Lifetime::Ui, |base| Probe::new(base, InjectionKind::Generic))
            .expect("attach");
        pipeline.process_newest(&field);

        assert_eq!(pipeline.eject_owned_by(player), 1);
        assert_eq!(pipeline.ledger_mark(player), None);
        assert_eq!(pipeline.update_pool_len(), 0);
    }
}
