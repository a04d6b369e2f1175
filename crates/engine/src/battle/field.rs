use std::cell::RefCell;
use std::ops::ControlFlow;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};

use super::component::{Component, ComponentBase, ComponentId, Lifetime, SharedComponent};
use super::defense::{Hit, HitFlags};
use super::entity::{Entity, EntityId, EntityIdAllocator, EntityKind};
use crate::render::{Color, ShaderKind, Vec2};

/// Columns including the two hidden edge columns.
pub const FIELD_COLUMNS: i32 = 8;
/// Rows including the two hidden edge rows.
pub const FIELD_ROWS: i32 = 5;
pub const TILE_WIDTH: f32 = 80.0;
pub const TILE_HEIGHT: f32 = 48.0;
const FIELD_TOP_PX: f32 = 160.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePos {
    pub x: i32,
    pub y: i32,
}

impl TilePos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Team {
    Red,
    Blue,
    Unknown,
}

/// Per-draw appearance of a tile. The compositor may change it while drawing and must put it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileVisual {
    pub color: Color,
    pub shader: Option<ShaderKind>,
}

impl Default for TileVisual {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            shader: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pos: TilePos,
    team: Team,
    highlighted: bool,
    pub visual: TileVisual,
    entities: Vec<EntityId>,
}

impl Tile {
    fn new(pos: TilePos) -> Self {
        let team = if pos.x <= FIELD_COLUMNS / 2 - 1 {
            Team::Red
        } else {
            Team::Blue
        };
        Self {
            pos,
            team,
            highlighted: false,
            visual: TileVisual::default(),
            entities: Vec::new(),
        }
    }

    pub fn pos(&self) -> TilePos {
        self.pos
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn is_edge(&self) -> bool {
        self.pos.x == 0
            || self.pos.y == 0
            || self.pos.x == FIELD_COLUMNS - 1
            || self.pos.y == FIELD_ROWS - 1
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    pub fn set_highlighted(&mut self, highlighted: bool) {
        self.highlighted = highlighted;
    }

    /// Screen-space center of the tile before any camera offset.
    pub fn position(&self) -> Vec2 {
        Vec2::new(
            (self.pos.x - 1) as f32 * TILE_WIDTH + TILE_WIDTH * 0.5,
            FIELD_TOP_PX + (self.pos.y - 1) as f32 * TILE_HEIGHT + TILE_HEIGHT * 0.5,
        )
    }

    /// Occupants in arrival order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("tile ({x}, {y}) is outside the field")]
    TileOutOfBounds { x: i32, y: i32 },
    #[error("entity {0:?} is not on the field")]
    UnknownEntity(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldEvent {
    Counter {
        victim: EntityId,
        aggressor: EntityId,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HitOutcome {
    pub damage_dealt: i32,
    pub blocked: bool,
    pub countered: bool,
    pub deleted: bool,
}

/// Owns every tile and entity of one encounter.
#[derive(Debug)]
pub struct Field {
    tiles: Vec<Tile>,
    entities: Vec<Entity>,
    allocator: EntityIdAllocator,
    next_component_id: u64,
    removed: Vec<Entity>,
    events: Vec<FieldEvent>,
    battle_active: bool,
    pending_battle_active: Option<bool>,
    reveal_counter_frames: bool,
}

impl Default for Field {
    fn default() -> Self {
        Self::new()
    }
}

impl Field {
    pub fn new() -> Self {
        let mut tiles = Vec::with_capacity((FIELD_COLUMNS * FIELD_ROWS) as usize);
        for y in 0..FIELD_ROWS {
            for x in 0..FIELD_COLUMNS {
                tiles.push(Tile::new(TilePos::new(x, y)));
            }
        }
        Self {
            tiles,
            entities: Vec::new(),
            allocator: EntityIdAllocator::default(),
            next_component_id: 1,
            removed: Vec::new(),
            events: Vec::new(),
            battle_active: false,
            pending_battle_active: None,
            reveal_counter_frames: false,
        }
    }

    fn tile_index(pos: TilePos) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= FIELD_COLUMNS || pos.y >= FIELD_ROWS {
            return None;
        }
        Some((pos.y * FIELD_COLUMNS + pos.x) as usize)
    }

    pub fn tile(&self, pos: TilePos) -> Option<&Tile> {
        Self::tile_index(pos).and_then(|index| self.tiles.get(index))
    }

    pub fn tile_mut(&mut self, pos: TilePos) -> Option<&mut Tile> {
        Self::tile_index(pos).and_then(|index| self.tiles.get_mut(index))
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile_positions(&self) -> Vec<TilePos> {
        self.tiles.iter().map(Tile::pos).collect()
    }

    pub fn for_each_tile(&self, mut visit: impl FnMut(&Tile) -> ControlFlow<()>) {
        for tile in &self.tiles {
            if visit(tile).is_break() {
                break;
            }
        }
    }

    pub fn set_all_highlighted(&mut self, highlighted: bool) {
        for tile in &mut self.tiles {
            tile.highlighted = highlighted;
        }
    }

    pub fn spawn(&mut self, mut entity: Entity, pos: TilePos) -> Result<EntityId, FieldError> {
        let index = Self::tile_index(pos).ok_or(FieldError::TileOutOfBounds {
            x: pos.x,
            y: pos.y,
        })?;
        let id = self.allocator.allocate();
        let team = self.tiles[index].team;
        entity.assign(id, pos, team);
        entity.set_battle_active(self.battle_active);
        self.tiles[index].entities.push(id);
        debug!(entity = id.0, name = %entity.name, x = pos.x, y = pos.y, "entity_spawned");
        self.entities.push(entity);
        Ok(id)
    }

    pub fn move_entity(&mut self, id: EntityId, pos: TilePos) -> Result<(), FieldError> {
        let to = Self::tile_index(pos).ok_or(FieldError::TileOutOfBounds {
            x: pos.x,
            y: pos.y,
        })?;
        let entity = self.entity_mut(id).ok_or(FieldError::UnknownEntity(id))?;
        let from = entity.tile();
        entity.set_tile(pos);
        if let Some(tile) = self.tile_mut(from) {
            tile.entities.retain(|occupant| *occupant != id);
        }
        self.tiles[to].entities.push(id);
        Ok(())
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id() == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id() == id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Snapshot of every entity id in spawn order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(Entity::id).collect()
    }

    pub fn find_entities(&self, predicate: impl Fn(&Entity) -> bool) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|entity| predicate(entity))
            .map(Entity::id)
            .collect()
    }

    pub fn for_each_entity(&self, mut visit: impl FnMut(&Entity) -> ControlFlow<()>) {
        for entity in &self.entities {
            if visit(entity).is_break() {
                break;
            }
        }
    }

    pub fn allocate_component_id(&mut self) -> ComponentId {
        let id = ComponentId(self.next_component_id);
        self.next_component_id = self.next_component_id.saturating_add(1);
        id
    }

    /// Attaches an already built component to the owner named in its base.
    pub fn register_component(&mut self, component: SharedComponent) -> Result<(), FieldError> {
        let (owner, id) = {
            let borrowed = component.borrow();
            (borrowed.owner(), borrowed.id())
        };
        let entity = self
            .entity_mut(owner)
            .ok_or(FieldError::UnknownEntity(owner))?;
        entity.push_component(component);
        debug!(entity = owner.0, component = id.0, "component_attached");
        Ok(())
    }

    pub fn attach_component<C, F>(
        &mut self,
        owner: EntityId,
        lifetime: Lifetime,
        build: F,
    ) -> Result<Rc<RefCell<C>>, FieldError>
    where
        C: Component + 'static,
        F: FnOnce(ComponentBase) -> C,
    {
        if self.entity(owner).is_none() {
            return Err(FieldError::UnknownEntity(owner));
        }
        let id = self.allocate_component_id();
        let component = Rc::new(RefCell::new(build(ComponentBase::new(id, owner, lifetime))));
        let shared: SharedComponent = component.clone();
        self.register_component(shared)?;
        Ok(component)
    }

    pub fn detach_component(&mut self, owner: EntityId, id: ComponentId) -> Option<SharedComponent> {
        self.entity_mut(owner)?.take_component(id)
    }

    pub fn request_battle_start(&mut self) {
        self.pending_battle_active = Some(true);
    }

    pub fn request_battle_stop(&mut self) {
        self.pending_battle_active = Some(false);
    }

    pub fn is_battle_active(&self) -> bool {
        self.battle_active
    }

    pub fn reveal_counter_frames(&mut self, reveal: bool) {
        self.reveal_counter_frames = reveal;
    }

    pub fn does_reveal_counter_frames(&self) -> bool {
        self.reveal_counter_frames
    }

    /// Runs the defender's rules, applies damage and queues a counter event when the hit lands
    /// during the defender's counter frames.
    pub fn apply_hit(&mut self, target: EntityId, mut hit: Hit) -> Result<HitOutcome, FieldError> {
        let entity = self
            .entities
            .iter_mut()
            .find(|entity| entity.id() == target)
            .ok_or(FieldError::UnknownEntity(target))?;
        if entity.is_deleted() {
            return Ok(HitOutcome::default());
        }

        let mut outcome = HitOutcome::default();
        match &mut entity.kind {
            EntityKind::Character(character) => {
                let judge = character.defense.judge(&mut hit, target);
                if judge.damage_blocked && judge.impact_blocked {
                    outcome.blocked = true;
                    return Ok(outcome);
                }
                if !judge.damage_blocked {
                    outcome.damage_dealt = hit.damage.min(character.health).max(0);
                    character.health -= outcome.damage_dealt;
                }
                let impact_lands = hit.flags.contains(HitFlags::IMPACT) && !judge.impact_blocked;
                if impact_lands && character.counterable && !hit.flags.contains(HitFlags::NO_COUNTER)
                {
                    if let Some(aggressor) = hit.aggressor {
                        character.counterable = false;
                        outcome.countered = true;
                        self.events.push(FieldEvent::Counter {
                            victim: target,
                            aggressor,
                        });
                    }
                }
                if character.health <= 0 {
                    outcome.deleted = true;
                }
            }
            EntityKind::Obstacle { health } => {
                outcome.damage_dealt = hit.damage.min(*health).max(0);
                *health -= outcome.damage_dealt;
                outcome.deleted = *health <= 0;
            }
            EntityKind::Spell { .. } | EntityKind::Artifact => {}
        }

        if outcome.deleted {
            entity.delete();
        }
        Ok(outcome)
    }

    pub fn drain_events(&mut self) -> Vec<FieldEvent> {
        std::mem::take(&mut self.events)
    }

    /// Entities swept by the most recent updates, in removal order.
    pub fn drain_removed(&mut self) -> Vec<Entity> {
        std::mem::take(&mut self.removed)
    }

    /// Sweeps entities deleted since the last update, applies pending battle start/stop
    /// requests, then animates entities and runs their local components.
    pub fn update(&mut self, elapsed: f64) {
        self.sweep_deleted();

        if let Some(active) = self.pending_battle_active.take() {
            self.battle_active = active;
            for entity in &mut self.entities {
                entity.set_battle_active(active);
            }
            info!(active, "battle_broadcast_applied");
        }

        for id in self.entity_ids() {
            let locals: Vec<SharedComponent> = match self.entity_mut(id) {
                Some(entity) => {
                    entity.animate(elapsed);
                    entity
                        .components()
                        .iter()
                        .filter(|component| component.borrow().lifetime() == Lifetime::Local)
                        .cloned()
                        .collect()
                }
                None => continue,
            };
            for component in locals {
                component.borrow_mut().update(elapsed, self);
            }
        }
    }

    fn sweep_deleted(&mut self) {
        if !self.entities.iter().any(Entity::is_deleted) {
            return;
        }
        let (deleted, kept): (Vec<Entity>, Vec<Entity>) = std::mem::take(&mut self.entities)
            .into_iter()
            .partition(Entity::is_deleted);
        self.entities = kept;
        for entity in deleted {
            if let Some(tile) = self.tile_mut(entity.tile()) {
                tile.entities.retain(|occupant| *occupant != entity.id());
            }
            debug!(entity = entity.id().0, name = %entity.name, "entity_swept");
            self.removed.push(entity);
        }
    }
}
