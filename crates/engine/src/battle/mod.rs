mod backdrop;
mod camera;
mod cards;
mod component;
mod compositor;
mod context;
mod defense;
mod entity;
mod field;
mod gauge;
mod injection;
mod mob;
mod scene;
mod services;
mod state_graph;
#[cfg(test)]
mod testing;
mod timer;
mod tracker;

pub use backdrop::Backdrop;
pub use camera::Camera;
pub use cards::{filter_support_cards, BattleCard};
pub use component::{
    CardUse, CardUsePublisher, Component, ComponentBase, ComponentId, DrawNode, InjectionKind,
    Lifetime, SharedComponent, UiOverlay,
};
pub use compositor::compose_frame;
pub use context::{BattleContext, BattleSceneConfig, COUNTER_REVEAL_TAG};
pub use defense::{
    CounterDefenseRule, DefenseJudge, DefenseOrder, DefensePriority, DefenseRule,
    DefenseRuleList, Hit, HitFlags, SharedDefenseRule,
};
pub use entity::{
    ActionVisual, Agent, Character, Controller, Emotion, Entity, EntityId, EntityIdAllocator,
    EntityKind, Sprite, SpriteNode,
};
pub use field::{
    Field, FieldError, FieldEvent, HitOutcome, Team, Tile, TilePos, TileVisual, FIELD_COLUMNS,
    FIELD_ROWS, TILE_HEIGHT, TILE_WIDTH,
};
pub use gauge::CustomGauge;
pub use injection::{InjectionPipeline, PoolGate};
pub use mob::{
    Encounter, EncounterError, EncounterErrorCode, Mob, MobMember, SourceLocation, SpawnDef,
};
pub use scene::{BattleScene, BattleSceneError};
pub use services::{
    ActivityController, AudioSink, Background, BattleServices, FadeOut, MusicTrack,
    PlainBackground, SilentAudio, SoundEffect,
};
pub use state_graph::{BattleState, Guard, StateGraph, StateGraphError, StateId, Transition};
pub use timer::{BattleClock, FrameTimer};
pub use tracker::{CombatTracker, COMBO_DISPLAY_SECONDS, COMBO_HIT_THRESHOLD_SECONDS};
