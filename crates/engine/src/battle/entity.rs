use crate::animation::{Animation, AnimationEvent};
use crate::render::{Color, SpriteFrame, Vec2};

use super::component::{ComponentId, SharedComponent};
use super::defense::{DefenseRuleList, SharedDefenseRule};
use super::field::{Team, TilePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

/// Texture key plus the animation that picks its sub-rectangle.
#[derive(Debug, Clone)]
pub struct Sprite {
    pub texture: String,
    pub animation: Animation,
    pub color: Color,
    pub visible: bool,
    last_events: Vec<AnimationEvent>,
}

impl Sprite {
    pub fn new(texture: impl Into<String>, animation: Animation) -> Self {
        Self {
            texture: texture.into(),
            animation,
            color: Color::WHITE,
            visible: true,
            last_events: Vec::new(),
        }
    }

    pub fn update(&mut self, elapsed: f64) {
        self.last_events = self.animation.update(elapsed);
    }

    /// Events produced by the most recent `update`.
    pub fn last_events(&self) -> &[AnimationEvent] {
        &self.last_events
    }

    /// `None` while hidden, when the state is missing, or on a blank frame.
    pub fn frame(&self) -> Option<SpriteFrame> {
        if !self.visible {
            return None;
        }
        let frame = self.animation.current_frame()?;
        if frame.is_blank() {
            return None;
        }
        Some(SpriteFrame {
            texture: self.texture.clone(),
            source: frame.rect,
            origin: frame.origin,
            flip_x: frame.flip_x,
            flip_y: frame.flip_y,
        })
    }
}

/// Sprite parented to an entity and drawn right after it.
#[derive(Debug, Clone)]
pub struct SpriteNode {
    pub tag: String,
    pub sprite: Sprite,
    pub offset: Vec2,
}

/// Visual of a card action in flight.
#[derive(Debug, Clone)]
pub struct ActionVisual {
    pub name: String,
    pub sprite: Sprite,
    pub offset: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Controller {
    Player,
    Ai,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Emotion {
    #[default]
    Normal,
    FullSynchro,
    Angry,
    Evil,
}

#[derive(Debug, Clone)]
pub struct Character {
    pub health: i32,
    pub max_health: i32,
    pub controller: Controller,
    pub emotion: Emotion,
    pub form: Option<String>,
    /// Open while the character is winding up; hits landing now count as counters.
    pub counterable: bool,
    pub current_action: Option<ActionVisual>,
    pub async_actions: Vec<ActionVisual>,
    pub defense: DefenseRuleList,
}

impl Character {
    pub fn new(health: i32, controller: Controller) -> Self {
        Self {
            health,
            max_health: health,
            controller,
            emotion: Emotion::Normal,
            form: None,
            counterable: false,
            current_action: None,
            async_actions: Vec::new(),
            defense: DefenseRuleList::default(),
        }
    }

    pub fn is_player(&self) -> bool {
        self.controller == Controller::Player
    }

    pub fn is_in_form(&self) -> bool {
        self.form.is_some()
    }

    pub fn add_defense_rule(&mut self, rule: SharedDefenseRule) {
        self.defense.add(rule);
    }

    pub fn remove_defense_rule(&mut self, rule: &SharedDefenseRule) -> bool {
        self.defense.remove(rule)
    }
}

#[derive(Debug, Clone)]
pub enum EntityKind {
    Character(Character),
    Obstacle { health: i32 },
    Spell { damage: i32 },
    Artifact,
}

/// AI capability: the entity it is currently chasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Agent {
    target: Option<EntityId>,
}

impl Agent {
    pub fn set_target(&mut self, target: EntityId) {
        self.target = Some(target);
    }

    pub fn target(&self) -> Option<EntityId> {
        self.target
    }

    pub fn free_target(&mut self) {
        self.target = None;
    }
}

#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    pub name: String,
    team: Team,
    tile: TilePos,
    pub elevation: f32,
    pub layer: i32,
    deleted: bool,
    battle_active: bool,
    pub sprite: Option<Sprite>,
    pub nodes: Vec<SpriteNode>,
    components: Vec<SharedComponent>,
    pub kind: EntityKind,
    pub agent: Option<Agent>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: EntityId(0),
            name: name.into(),
            team: Team::Unknown,
            tile: TilePos::new(0, 0),
            elevation: 0.0,
            layer: 0,
            deleted: false,
            battle_active: false,
            sprite: None,
            nodes: Vec::new(),
            components: Vec::new(),
            kind,
            agent: None,
        }
    }

    pub fn character(name: impl Into<String>, health: i32, controller: Controller) -> Self {
        let entity = Self::new(name, EntityKind::Character(Character::new(health, controller)));
        match controller {
            Controller::Player => entity,
            Controller::Ai => entity.with_agent(),
        }
    }

    pub fn with_team(mut self, team: Team) -> Self {
        self.team = team;
        self
    }

    pub fn with_sprite(mut self, sprite: Sprite) -> Self {
        self.sprite = Some(sprite);
        self
    }

    pub fn with_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_elevation(mut self, elevation: f32) -> Self {
        self.elevation = elevation;
        self
    }

    pub fn with_agent(mut self) -> Self {
        self.agent = Some(Agent::default());
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn tile(&self) -> TilePos {
        self.tile
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Marks the entity for removal; the field sweeps it at the start of its next update.
    pub fn delete(&mut self) {
        self.deleted = true;
    }

    pub fn is_battle_active(&self) -> bool {
        self.battle_active
    }

    pub fn as_character(&self) -> Option<&Character> {
        match &self.kind {
            EntityKind::Character(character) => Some(character),
            _ => None,
        }
    }

    pub fn as_character_mut(&mut self) -> Option<&mut Character> {
        match &mut self.kind {
            EntityKind::Character(character) => Some(character),
            _ => None,
        }
    }

    pub fn as_agent(&self) -> Option<&Agent> {
        self.agent.as_ref()
    }

    pub fn as_agent_mut(&mut self) -> Option<&mut Agent> {
        self.agent.as_mut()
    }

    pub fn is_player(&self) -> bool {
        self.as_character().is_some_and(Character::is_player)
    }

    /// Attached components, newest first.
    pub fn components(&self) -> &[SharedComponent] {
        &self.components
    }

    pub fn newest_component_id(&self) -> Option<ComponentId> {
        self.components
            .first()
            .map(|component| component.borrow().id())
    }

    pub fn add_node(&mut self, node: SpriteNode) {
        self.nodes.push(node);
    }

    pub fn remove_node(&mut self, tag: &str) -> Option<SpriteNode> {
        let index = self.nodes.iter().position(|node| node.tag == tag)?;
        Some(self.nodes.remove(index))
    }

    pub fn has_node(&self, tag: &str) -> bool {
        self.nodes.iter().any(|node| node.tag == tag)
    }

    pub(crate) fn assign(&mut self, id: EntityId, tile: TilePos, team: Team) {
        self.id = id;
        self.tile = tile;
        if self.team == Team::Unknown {
            self.team = team;
        }
    }

    pub(crate) fn set_tile(&mut self, tile: TilePos) {
        self.tile = tile;
    }

    pub(crate) fn set_battle_active(&mut self, active: bool) {
        self.battle_active = active;
    }

    pub(crate) fn push_component(&mut self, component: SharedComponent) {
        self.components.insert(0, component);
    }

    pub(crate) fn take_component(&mut self, id: ComponentId) -> Option<SharedComponent> {
        let index = self
            .components
            .iter()
            .position(|component| component.borrow().id() == id)?;
        Some(self.components.remove(index))
    }

    pub(crate) fn animate(&mut self, elapsed: f64) {
        if let Some(sprite) = self.sprite.as_mut() {
            sprite.update(elapsed);
        }
        for node in &mut self.nodes {
            node.sprite.update(elapsed);
        }
        if let EntityKind::Character(character) = &mut self.kind {
            for action in &mut character.async_actions {
                action.sprite.update(elapsed);
            }
            if let Some(action) = character.current_action.as_mut() {
                action.sprite.update(elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLINK: &str = "animation state=\"IDLE\"\nframe duration=\"0.5\" x=\"0\" y=\"0\" w=\"8\" h=\"8\"\nblank duration=\"0.5\"\n";

    #[test]
    fn allocator_hands_out_increasing_ids() {
        let mut allocator = EntityIdAllocator::default();
        assert_eq!(allocator.allocate(), EntityId(0));
        assert_eq!(allocator.allocate(), EntityId(1));
    }

    #[test]
    fn capability_views_follow_the_kind() {
        let player = Entity::character("Mega", 100, Controller::Player);
        assert!(player.as_character().is_some());
        assert!(player.as_agent().is_none());
        assert!(player.is_player());

        let mettaur = Entity::character("Mettaur", 40, Controller::Ai);
        assert!(mettaur.as_agent().is_some());
        assert!(!mettaur.is_player());

        let rock = Entity::new("Rock", EntityKind::Obstacle { health: 10 });
        assert!(rock.as_character().is_none());
    }

    #[test]
    fn sprite_frame_hides_blank_frames() {
        let mut animation = Animation::from_data(BLINK);
        animation.set_state("IDLE");
        let mut sprite = Sprite::new("mobs/blink", animation);

        let frame = sprite.frame().expect("visible frame");
        assert_eq!(frame.texture, "mobs/blink");
        assert_eq!(frame.source.width, 8);

        sprite.update(0.6);
        assert!(sprite.frame().is_none());
    }

    #[test]
    fn nodes_are_found_by_tag() {
        let mut entity = Entity::character("Mega", 100, Controller::Player);
        entity.add_node(SpriteNode {
            tag: "ring".to_string(),
            sprite: Sprite::new("misc/ring", Animation::default()),
            offset: Vec2::ZERO,
        });
        assert!(entity.has_node("ring"));
        assert!(entity.remove_node("ring").is_some());
        assert!(entity.remove_node("ring").is_none());
    }
}
