use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::{info, warn};

use super::entity::{Controller, Entity, EntityId, Sprite};
use super::field::{Field, FieldError, TilePos};
use super::services::MusicTrack;
use crate::animation::AnimationLibrary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobMember {
    pub id: EntityId,
    pub name: String,
}

/// Roster of the enemies this encounter must clear.
#[derive(Debug, Clone, Default)]
pub struct Mob {
    members: Vec<MobMember>,
    boss: bool,
    music: Option<MusicTrack>,
}

impl Mob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: EntityId, name: impl Into<String>) {
        self.members.push(MobMember {
            id,
            name: name.into(),
        });
    }

    pub fn count(&self) -> usize {
        self.members.len()
    }

    pub fn is_cleared(&self) -> bool {
        self.members.is_empty()
    }

    pub fn forget(&mut self, id: EntityId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member.id != id);
        before != self.members.len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.members.iter().any(|member| member.id == id)
    }

    pub fn member(&self, index: usize) -> Option<&MobMember> {
        self.members.get(index)
    }

    pub fn members(&self) -> &[MobMember] {
        &self.members
    }

    pub fn is_boss(&self) -> bool {
        self.boss
    }

    pub fn set_boss(&mut self, boss: bool) {
        self.boss = boss;
    }

    pub fn music(&self) -> Option<&MusicTrack> {
        self.music.as_ref()
    }

    pub fn set_music(&mut self, music: MusicTrack) {
        self.music = Some(music);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnDef {
    pub name: String,
    pub tile: TilePos,
    pub health: i32,
    pub layer: i32,
    pub elevation: f32,
    pub texture: Option<String>,
    pub animation: Option<String>,
    pub state: String,
}

/// Enemy lineup and presentation metadata read from an encounter XML file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Encounter {
    pub boss: bool,
    pub music: Option<MusicTrack>,
    pub spawns: Vec<SpawnDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncounterErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    MissingAttribute,
    InvalidValue,
}

#[derive(Debug, Clone)]
pub struct EncounterError {
    pub code: EncounterErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for EncounterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for EncounterError {}

impl Encounter {
    pub fn load(path: &Path) -> Result<Self, EncounterError> {
        let raw = fs::read_to_string(path).map_err(|error| EncounterError {
            code: EncounterErrorCode::ReadFile,
            message: format!("failed to read encounter: {error}"),
            file_path: path.to_path_buf(),
            location: None,
        })?;
        Self::parse(path, &raw)
    }

    /// `file_path` only labels errors.
    pub fn parse(file_path: &Path, raw: &str) -> Result<Self, EncounterError> {
        let doc = Document::parse(raw).map_err(|error| EncounterError {
            code: EncounterErrorCode::XmlMalformed,
            message: format!("malformed XML: {error}"),
            file_path: file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            }),
        })?;
        let parser = EncounterParser {
            file_path,
            doc: &doc,
        };

        let root = doc.root_element();
        if root.tag_name().name() != "Encounter" {
            return Err(parser.error_at(
                EncounterErrorCode::InvalidRoot,
                "root element must be <Encounter>".to_string(),
                root,
            ));
        }

        let mut encounter = Encounter {
            boss: parser.optional_bool(root, "boss")?.unwrap_or(false),
            music: None,
            spawns: Vec::new(),
        };

        for child in root.children().filter(|node| node.is_element()) {
            match child.tag_name().name() {
                "Music" => {
                    let path = parser.required(child, "path")?;
                    let start = parser.optional_number::<u32>(child, "loopStart")?.unwrap_or(0);
                    let end = parser.optional_number::<u32>(child, "loopEnd")?.unwrap_or(0);
                    encounter.music = Some(MusicTrack::new(path).with_loop(start, end));
                }
                "Spawn" => encounter.spawns.push(parser.spawn(child)?),
                other => {
                    return Err(parser.error_at(
                        EncounterErrorCode::UnknownElement,
                        format!("unsupported element <{other}>; expected <Music> or <Spawn>"),
                        child,
                    ))
                }
            }
        }

        Ok(encounter)
    }

    /// Spawns every enemy onto `field` and returns the roster. Sprites whose animation fails
    /// to load stay invisible.
    pub fn populate(
        &self,
        field: &mut Field,
        animations: &mut AnimationLibrary,
    ) -> Result<Mob, FieldError> {
        let mut mob = Mob::new();
        mob.set_boss(self.boss);
        if let Some(music) = &self.music {
            mob.set_music(music.clone());
        }

        for spawn in &self.spawns {
            let mut entity = Entity::character(&spawn.name, spawn.health, Controller::Ai)
                .with_layer(spawn.layer)
                .with_elevation(spawn.elevation);
            if let (Some(texture), Some(key)) = (&spawn.texture, &spawn.animation) {
                match animations.load(key) {
                    Ok(mut animation) => {
                        animation.set_state(&spawn.state);
                        entity = entity.with_sprite(Sprite::new(texture.clone(), animation));
                    }
                    Err(error) => {
                        warn!(name = %spawn.name, key = %key, error = %error, "spawn_animation_failed");
                    }
                }
            }
            let id = field.spawn(entity, spawn.tile)?;
            mob.add(id, spawn.name.clone());
        }

        info!(count = mob.count(), boss = mob.is_boss(), "mob_loaded");
        Ok(mob)
    }
}

struct EncounterParser<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl EncounterParser<'_, '_> {
    fn spawn(&self, node: Node<'_, '_>) -> Result<SpawnDef, EncounterError> {
        Ok(SpawnDef {
            name: self.required(node, "name")?.to_string(),
            tile: TilePos::new(
                self.required_number::<i32>(node, "x")?,
                self.required_number::<i32>(node, "y")?,
            ),
            health: self.required_number::<i32>(node, "health")?,
            layer: self.optional_number::<i32>(node, "layer")?.unwrap_or(0),
            elevation: self.optional_number::<f32>(node, "elevation")?.unwrap_or(0.0),
            texture: node.attribute("texture").map(str::to_string),
            animation: node.attribute("animation").map(str::to_string),
            state: node.attribute("state").unwrap_or("IDLE").to_string(),
        })
    }

    fn required<'n>(&self, node: Node<'n, '_>, attribute: &str) -> Result<&'n str, EncounterError> {
        node.attribute(attribute).ok_or_else(|| {
            self.error_at(
                EncounterErrorCode::MissingAttribute,
                format!(
                    "<{}> is missing attribute '{attribute}'",
                    node.tag_name().name()
                ),
                node,
            )
        })
    }

    fn required_number<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        attribute: &str,
    ) -> Result<T, EncounterError> {
        let raw = self.required(node, attribute)?;
        self.number(node, attribute, raw)
    }

    fn optional_number<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        attribute: &str,
    ) -> Result<Option<T>, EncounterError> {
        node.attribute(attribute)
            .map(|raw| self.number(node, attribute, raw))
            .transpose()
    }

    fn optional_bool(
        &self,
        node: Node<'_, '_>,
        attribute: &str,
    ) -> Result<Option<bool>, EncounterError> {
        match node.attribute(attribute) {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(other) => Err(self.error_at(
                EncounterErrorCode::InvalidValue,
                format!("attribute '{attribute}' must be true or false, got '{other}'"),
                node,
            )),
        }
    }

    fn number<T: std::str::FromStr>(
        &self,
        node: Node<'_, '_>,
        attribute: &str,
        raw: &str,
    ) -> Result<T, EncounterError> {
        raw.trim().parse::<T>().map_err(|_| {
            self.error_at(
                EncounterErrorCode::InvalidValue,
                format!("attribute '{attribute}' has invalid number '{raw}'"),
                node,
            )
        })
    }

    fn error_at(
        &self,
        code: EncounterErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> EncounterError {
        let pos = self.doc.text_pos_at(node.range().start);
        EncounterError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const ENCOUNTER: &str = r#"<Encounter boss="true">
  <Music path="music/boss.ogg" loopStart="1200" loopEnd="64000"/>
  <Spawn name="Mettaur" x="5" y="2" health="40" texture="mobs/mettaur" animation="mobs/mettaur"/>
  <Spawn name="Canodumb" x="6" y="1" health="60" layer="1" elevation="4.5"/>
</Encounter>"#;

    #[test]
    fn parses_music_and_spawns() {
        let encounter = Encounter::parse(Path::new("boss.xml"), ENCOUNTER).expect("parse");
        assert!(encounter.boss);
        assert_eq!(
            encounter.music,
            Some(MusicTrack::new("music/boss.ogg").with_loop(1200, 64000))
        );
        assert_eq!(encounter.spawns.len(), 2);
        assert_eq!(encounter.spawns[1].tile, TilePos::new(6, 1));
        assert_eq!(encounter.spawns[1].layer, 1);
        assert_eq!(encounter.spawns[0].state, "IDLE");
    }

    #[test]
    fn errors_point_at_the_offending_element() {
        let raw = "<Encounter>\n  <Spawn name=\"A\" x=\"one\" y=\"2\" health=\"1\"/>\n</Encounter>";
        let error = Encounter::parse(Path::new("bad.xml"), raw).expect_err("invalid");
        assert_eq!(error.code, EncounterErrorCode::InvalidValue);
        assert_eq!(error.location.map(|loc| loc.line), Some(2));

        let error = Encounter::parse(Path::new("bad.xml"), "<Mob/>").expect_err("root");
        assert_eq!(error.code, EncounterErrorCode::InvalidRoot);

        let error = Encounter::parse(Path::new("bad.xml"), "<Encounter>").expect_err("xml");
        assert_eq!(error.code, EncounterErrorCode::XmlMalformed);
    }

    #[test]
    fn populate_spawns_enemies_and_tolerates_missing_animation() {
        let temp = TempDir::new().expect("tempdir");
        fs::create_dir_all(temp.path().join("mobs")).expect("mkdir");
        fs::write(
            temp.path().join("mobs").join("mettaur.animation"),
            "animation state=\"IDLE\"\nframe duration=\"1\" x=\"0\" y=\"0\" w=\"4\" h=\"4\"\n",
        )
        .expect("write");

        let mut raw = ENCOUNTER.replace("x=\"6\" y=\"1\" health=\"60\"", "x=\"6\" y=\"1\" health=\"60\" texture=\"mobs/canodumb\" animation=\"mobs/canodumb\"");
        raw.push('\n');
        let encounter = Encounter::parse(Path::new("boss.xml"), &raw).expect("parse");

        let mut field = Field::new();
        let mut animations = AnimationLibrary::new(temp.path());
        let mob = encounter.populate(&mut field, &mut animations).expect("populate");

        assert_eq!(mob.count(), 2);
        assert!(mob.is_boss());
        let first = field.entity(mob.member(0).expect("member").id).expect("entity");
        assert!(first.sprite.as_ref().and_then(Sprite::frame).is_some());
        let second = field.entity(mob.member(1).expect("member").id).expect("entity");
        assert!(second.sprite.is_none());
    }

    #[test]
    fn roster_forgets_members_until_cleared() {
        let mut mob = Mob::new();
        mob.add(EntityId(1), "A");
        mob.add(EntityId(2), "B");
        assert!(mob.forget(EntityId(1)));
        assert!(!mob.forget(EntityId(1)));
        assert!(!mob.is_cleared());
        assert!(mob.forget(EntityId(2)));
        assert!(mob.is_cleared());
    }
}
