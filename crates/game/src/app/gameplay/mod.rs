mod components;
mod states;

use std::path::PathBuf;

use battle_engine::animation::AnimationLibrary;
use battle_engine::battle::{
    BattleScene, BattleSceneConfig, BattleSceneError, BattleServices, Controller, CustomGauge,
    Encounter, EncounterError, Entity, EntityId, Field, FieldError, FadeOut, Lifetime,
    SilentAudio, Sprite, TilePos,
};
use battle_engine::render::{Color, DrawCommand, DrawList, DrawPass, DrawSurface, Vec2};
use battle_engine::{
    write_results_atomic, ActivityStack, AppPaths, BattleHost, HostCommand, InputSnapshot,
    BATTLE_VIEW_HEIGHT, BATTLE_VIEW_WIDTH,
};
use thiserror::Error;
use tracing::{error, info, warn};

use self::components::{CardHand, EnemyAi, HealthOverlay};
use super::settings::BattleSettings;

const PLAYER_IDLE_STATE: &str = "PLAYER_IDLE";
const ENEMY_ATTACK_DAMAGE: i32 = 10;
const ENEMY_ATTACK_EVERY_SECONDS: f64 = 2.5;
const EXIT_FADE_SECONDS: f64 = 0.5;

#[derive(Debug, Error)]
pub(crate) enum SessionError {
    #[error(transparent)]
    Encounter(#[from] EncounterError),
    #[error("failed to set up the battle field: {0}")]
    Field(#[from] FieldError),
    #[error("failed to set up the battle scene: {0}")]
    Scene(#[from] BattleSceneError),
}

#[derive(Debug, Clone, Copy)]
struct ExitFade {
    fade: FadeOut,
    elapsed: f64,
}

/// One battle hosted inside the window loop. Leaves the loop once the scene pops itself off
/// the activity stack, after the requested fade has played.
pub(crate) struct BattleSession {
    scene: BattleScene,
    stack: ActivityStack,
    start_depth: usize,
    exit_fade: Option<ExitFade>,
    results_path: PathBuf,
}

impl BattleSession {
    fn advance_exit_fade(&mut self, dt: f64) -> Option<HostCommand> {
        let fade = self.exit_fade.as_mut()?;
        fade.elapsed += dt;
        Some(if fade.elapsed >= EXIT_FADE_SECONDS {
            HostCommand::Exit
        } else {
            HostCommand::Continue
        })
    }
}

impl BattleHost for BattleSession {
    fn update(&mut self, fixed_dt_seconds: f64, input: &InputSnapshot) -> HostCommand {
        if let Some(command) = self.advance_exit_fade(fixed_dt_seconds) {
            return command;
        }

        if let Err(err) = self.scene.update(fixed_dt_seconds, input) {
            error!(error = %err, "battle_update_failed");
            return HostCommand::Exit;
        }

        if self.stack.depth() >= self.start_depth {
            return HostCommand::Continue;
        }
        match self.stack.last_fade() {
            Some(fade) => {
                info!(?fade, "battle_exit_fade_started");
                self.exit_fade = Some(ExitFade { fade, elapsed: 0.0 });
                HostCommand::Continue
            }
            None => HostCommand::Exit,
        }
    }

    fn render(&mut self, list: &mut DrawList) {
        self.scene.draw(list);
        if let Some(fade) = self.exit_fade {
            let alpha = (fade.elapsed / EXIT_FADE_SECONDS).clamp(0.0, 1.0);
            list.draw(DrawCommand::Rect {
                pass: DrawPass::State,
                position: Vec2::ZERO,
                size: Vec2::new(BATTLE_VIEW_WIDTH as f32, BATTLE_VIEW_HEIGHT as f32),
                color: fade_color(fade.fade, (alpha * 255.0) as u8),
            });
        }
    }

    fn shutdown(&mut self) {
        let results = self.scene.finish();
        match write_results_atomic(&self.results_path, &results) {
            Ok(()) => info!(path = %self.results_path.display(), "battle_results_written"),
            Err(err) => error!(error = %err, "battle_results_write_failed"),
        }
    }
}

fn fade_color(fade: FadeOut, alpha: u8) -> Color {
    match fade {
        FadeOut::White => Color::rgba(255, 255, 255, alpha),
        FadeOut::Black => Color::rgba(0, 0, 0, alpha),
        FadeOut::Pixelate => Color::rgba(128, 128, 128, alpha),
    }
}

/// Loads the encounter, spawns the player and the mob, and starts the scene.
pub(crate) fn build_session(
    settings: &BattleSettings,
    paths: &AppPaths,
) -> Result<BattleSession, SessionError> {
    let encounter_path = settings.encounter_path(&paths.assets_dir);
    let encounter = Encounter::load(&encounter_path)?;
    info!(path = %encounter_path.display(), "encounter_loaded");

    let mut field = Field::new();
    let mut animations = AnimationLibrary::new(paths.assets_dir.clone());

    let player_settings = &settings.player;
    let mut player_entity = Entity::character(
        player_settings.name.clone(),
        player_settings.health,
        Controller::Player,
    );
    match animations.load(&player_settings.animation) {
        Ok(mut animation) => {
            animation.set_state(PLAYER_IDLE_STATE);
            player_entity =
                player_entity.with_sprite(Sprite::new(player_settings.texture.clone(), animation));
        }
        Err(err) => {
            warn!(key = %player_settings.animation, error = %err, "player_animation_failed");
        }
    }
    let player = field.spawn(
        player_entity,
        TilePos::new(player_settings.x, player_settings.y),
    )?;
    let hand = field.attach_component(player, Lifetime::Ui, CardHand::new)?;

    let mob = encounter.populate(&mut field, &mut animations)?;
    let enemies: Vec<EntityId> = mob.members().iter().map(|member| member.id).collect();
    for enemy in enemies {
        arm_enemy(&mut field, enemy, player)?;
    }

    let stack = ActivityStack::new(settings.activity_depth);
    let services = BattleServices::new(Box::new(SilentAudio), Box::new(stack.clone()));
    let mut scene = BattleScene::new(field, mob, player, services, BattleSceneConfig::default())?;
    scene.context_mut().gauge = CustomGauge::new(settings.custom_gauge_seconds);

    let initial = states::install_states(
        &mut scene,
        hand,
        settings.battle_folder(),
        player_settings.buster_damage,
    )?;
    scene.set_on_end(|results| {
        info!(
            runaway = results.runaway,
            player_health = results.player_health,
            turns = results.turns,
            rounds = results.rounds,
            counters = results.counter_count,
            enemies_deleted = results.enemies_deleted,
            battle_seconds = results.battle_seconds,
            "battle_ended"
        );
    });
    scene.start(initial)?;

    Ok(BattleSession {
        scene,
        start_depth: stack.depth(),
        stack,
        exit_fade: None,
        results_path: paths.results_dir.join(&settings.results_file),
    })
}

/// Gives an enemy its target, a health readout and an attack pattern.
fn arm_enemy(field: &mut Field, enemy: EntityId, player: EntityId) -> Result<(), FieldError> {
    let Some(entity) = field.entity_mut(enemy) else {
        return Err(FieldError::UnknownEntity(enemy));
    };
    let health = entity.as_character().map_or(0, |character| character.health);
    entity.agent.get_or_insert_with(Default::default).set_target(player);

    field.attach_component(enemy, Lifetime::Ui, |base| HealthOverlay::new(base, health))?;
    field.attach_component(enemy, Lifetime::BattleStep, |base| {
        EnemyAi::new(base, ENEMY_ATTACK_DAMAGE, ENEMY_ATTACK_EVERY_SECONDS)
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use battle_engine::InputAction;
    use std::fs;
    use tempfile::TempDir;

    const ENCOUNTER: &str = r#"<Encounter>
  <Spawn name="Mettaur" x="5" y="2" health="40"/>
</Encounter>"#;

    fn paths(temp: &TempDir) -> AppPaths {
        let assets_dir = temp.path().join("assets");
        fs::create_dir_all(assets_dir.join("encounters")).expect("assets");
        fs::write(assets_dir.join("encounters/default.xml"), ENCOUNTER).expect("encounter");
        AppPaths {
            root: temp.path().to_path_buf(),
            assets_dir,
            results_dir: temp.path().join("results"),
        }
    }

    #[test]
    fn session_starts_with_enemies_armed() {
        let temp = TempDir::new().expect("temp");
        let session = build_session(&BattleSettings::default(), &paths(&temp)).expect("session");

        let ctx = session.scene.context();
        assert_eq!(ctx.mob.count(), 1);
        let enemy = ctx.mob.members()[0].id;
        let entity = ctx.field.entity(enemy).expect("enemy");
        assert_eq!(
            entity.as_agent().and_then(|agent| agent.target()),
            ctx.player()
        );
        assert_eq!(entity.components().len(), 2);
        assert_eq!(session.scene.current_state_name(), Some("intro"));
    }

    #[test]
    fn quitting_fades_before_leaving_and_writes_results() {
        let temp = TempDir::new().expect("temp");
        let paths = paths(&temp);
        let mut session = build_session(&BattleSettings::default(), &paths).expect("session");

        let quit = InputSnapshot::empty().with_action_pressed(InputAction::Quit);
        assert_eq!(session.update(1.0 / 60.0, &quit), HostCommand::Continue);
        assert!(session.exit_fade.is_some());
        assert_eq!(
            session.update(EXIT_FADE_SECONDS, &InputSnapshot::empty()),
            HostCommand::Exit
        );

        session.shutdown();
        let written = fs::read_to_string(paths.results_dir.join("last_battle.json"))
            .expect("results file");
        assert!(written.contains("\"runaway\": true"), "{written}");
    }

    #[test]
    fn single_activity_stack_exits_without_fade() {
        let temp = TempDir::new().expect("temp");
        let settings = BattleSettings {
            activity_depth: 1,
            ..BattleSettings::default()
        };
        let mut session = build_session(&settings, &paths(&temp)).expect("session");

        let quit = InputSnapshot::empty().with_action_pressed(InputAction::Quit);
        assert_eq!(session.update(1.0 / 60.0, &quit), HostCommand::Exit);
    }

    #[test]
    fn missing_encounter_is_reported() {
        let temp = TempDir::new().expect("temp");
        let settings = BattleSettings {
            encounter: "encounters/nope.xml".to_string(),
            ..BattleSettings::default()
        };
        let result = build_session(&settings, &paths(&temp));
        assert!(matches!(result, Err(SessionError::Encounter(_))));
    }
}
