use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use super::field::Field;
use super::EntityId;
use crate::render::{DrawSurface, Vec2};

/// Allocated by the [`Field`]; later attachments always get larger ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Updated by the field with its owner; never surfaces to the scene.
    Local,
    /// Updated by the scene while the battle-step clock runs, or always once the mob is cleared.
    BattleStep,
    /// Updated by the scene once the battle-step clock has run at all.
    Ui,
}

/// How a component wants to be pooled when the scene first sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionKind {
    Generic,
    HealthOverlay,
    CardUsePublisher,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentBase {
    id: ComponentId,
    owner: EntityId,
    lifetime: Lifetime,
    scene_bound: bool,
}

impl ComponentBase {
    pub fn new(id: ComponentId, owner: EntityId, lifetime: Lifetime) -> Self {
        Self {
            id,
            owner,
            lifetime,
            scene_bound: false,
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn is_scene_bound(&self) -> bool {
        self.scene_bound
    }

    pub(crate) fn set_scene_bound(&mut self, bound: bool) {
        self.scene_bound = bound;
    }
}

/// Drawn by the scene after entity overlays.
pub trait DrawNode {
    fn draw(&self, field: &Field, view_offset: Vec2, surface: &mut dyn DrawSurface);
}

/// Drawn on top of its owner during the UI pass.
pub trait UiOverlay {
    fn draws_in_ui_pass(&self) -> bool {
        true
    }

    fn draw_ui(&self, field: &Field, view_offset: Vec2, surface: &mut dyn DrawSurface);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardUse {
    pub actor: EntityId,
    pub card: String,
    pub damage: i32,
}

pub trait CardUsePublisher {
    /// Cards used since the previous drain, oldest first.
    fn drain_card_uses(&mut self) -> Vec<CardUse>;
}

pub trait Component: Debug {
    fn base(&self) -> &ComponentBase;

    fn base_mut(&mut self) -> &mut ComponentBase;

    fn update(&mut self, elapsed: f64, field: &mut Field);

    fn injection(&self) -> InjectionKind {
        InjectionKind::Generic
    }

    fn as_draw_node(&self) -> Option<&dyn DrawNode> {
        None
    }

    fn as_ui(&self) -> Option<&dyn UiOverlay> {
        None
    }

    fn as_card_publisher(&mut self) -> Option<&mut dyn CardUsePublisher> {
        None
    }

    fn id(&self) -> ComponentId {
        self.base().id()
    }

    fn owner(&self) -> EntityId {
        self.base().owner()
    }

    fn lifetime(&self) -> Lifetime {
        self.base().lifetime()
    }
}

pub type SharedComponent = Rc<RefCell<dyn Component>>;
