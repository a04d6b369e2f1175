use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::render::{IntRect, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPoint {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub duration: f32,
    pub rect: IntRect,
    pub origin: Vec2,
    pub flip_x: bool,
    pub flip_y: bool,
    pub points: BTreeMap<String, AnchorPoint>,
}

impl Frame {
    pub fn blank(duration: f32) -> Self {
        Self {
            duration,
            rect: IntRect::default(),
            origin: Vec2::ZERO,
            flip_x: false,
            flip_y: false,
            points: BTreeMap::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.rect.is_empty()
    }
}

/// Ordered frames of one named state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameList {
    frames: Vec<Frame>,
    points: BTreeMap<String, AnchorPoint>,
    total_duration: f64,
}

impl FrameList {
    pub fn push(&mut self, frame: Frame) {
        self.total_duration += f64::from(frame.duration);
        self.frames.push(frame);
    }

    /// Points declared after a frame belong to that frame; points declared before the first
    /// frame apply to the whole list.
    pub fn set_point(&mut self, name: String, point: AnchorPoint) {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.points.insert(name, point);
            }
            None => {
                self.points.insert(name, point);
            }
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn point(&self, frame_index: usize, name: &str) -> Option<AnchorPoint> {
        self.frames
            .get(frame_index)
            .and_then(|frame| frame.points.get(name))
            .or_else(|| self.points.get(name))
            .copied()
    }

    pub fn start_of(&self, index: usize) -> f64 {
        self.frames
            .iter()
            .take(index)
            .map(|frame| f64::from(frame.duration))
            .sum()
    }

    /// Frame shown at `progress` seconds; past the end this is the last frame.
    pub fn frame_index_at(&self, progress: f64) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        let mut end = 0.0;
        for (index, frame) in self.frames.iter().enumerate() {
            end += f64::from(frame.duration);
            if progress < end {
                return Some(index);
            }
        }
        Some(self.frames.len() - 1)
    }
}

/// Parsed contents of one `.animation` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationDocument {
    states: HashMap<String, FrameList>,
    legacy: bool,
}

impl AnimationDocument {
    pub fn parse(data: &str) -> Self {
        let mut parser = Parser::default();
        for (index, line) in data.lines().enumerate() {
            if let Err(SkipLine(reason)) = parser.feed(line) {
                debug!(line = index + 1, reason, "animation_line_skipped");
            }
        }
        parser.finish()
    }

    pub fn state(&self, name: &str) -> Option<&FrameList> {
        self.states.get(&name.to_ascii_uppercase())
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.state(name).is_some()
    }

    pub fn state_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.states.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }
}

struct SkipLine(&'static str);

#[derive(Default)]
struct Parser {
    states: HashMap<String, FrameList>,
    current: Option<(String, FrameList)>,
    legacy: bool,
    carried_width: i32,
    carried_height: i32,
}

impl Parser {
    fn feed(&mut self, line: &str) -> Result<(), SkipLine> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if line.contains("VERSION") {
            if value_of(line, "VERSION") == Some("1.0") {
                self.legacy = true;
            }
            Ok(())
        } else if line.contains("imagePath") {
            Ok(())
        } else if line.contains("animation") {
            self.begin_state(line)
        } else if line.contains("blank") {
            let duration = duration_attr(line)?;
            self.current_list()?.push(Frame::blank(duration));
            Ok(())
        } else if line.contains("frame") {
            self.push_frame(line)
        } else if line.contains("point") {
            self.push_point(line)
        } else {
            Err(SkipLine("unknown_directive"))
        }
    }

    fn begin_state(&mut self, line: &str) -> Result<(), SkipLine> {
        self.close_state();
        if self.legacy {
            self.carried_width = int_attr(line, "width")?;
            self.carried_height = int_attr(line, "height")?;
        }
        let name = value_of(line, "state").unwrap_or_default().to_ascii_uppercase();
        self.current = Some((name, FrameList::default()));
        Ok(())
    }

    fn push_frame(&mut self, line: &str) -> Result<(), SkipLine> {
        let duration = duration_attr(line)?;
        let frame = if self.legacy {
            Frame {
                rect: IntRect::new(
                    int_attr(line, "startx")?,
                    int_attr(line, "starty")?,
                    self.carried_width,
                    self.carried_height,
                ),
                ..Frame::blank(duration)
            }
        } else {
            let rect = IntRect::new(
                int_attr(line, "x")?,
                int_attr(line, "y")?,
                int_attr(line, "w")?,
                int_attr(line, "h")?,
            );
            self.carried_width = rect.width;
            self.carried_height = rect.height;
            Frame {
                duration,
                rect,
                origin: Vec2::new(
                    int_attr(line, "originx")? as f32,
                    int_attr(line, "originy")? as f32,
                ),
                flip_x: bool_attr(line, "flipx"),
                flip_y: bool_attr(line, "flipy"),
                points: BTreeMap::new(),
            }
        };
        self.current_list()?.push(frame);
        Ok(())
    }

    fn push_point(&mut self, line: &str) -> Result<(), SkipLine> {
        let name = value_of(line, "label")
            .ok_or(SkipLine("point_without_label"))?
            .to_ascii_uppercase();
        let point = AnchorPoint {
            x: int_attr(line, "x")?,
            y: int_attr(line, "y")?,
        };
        self.current_list()?.set_point(name, point);
        Ok(())
    }

    fn current_list(&mut self) -> Result<&mut FrameList, SkipLine> {
        self.current
            .as_mut()
            .map(|(_, list)| list)
            .ok_or(SkipLine("directive_outside_animation"))
    }

    fn close_state(&mut self) {
        if let Some((name, list)) = self.current.take() {
            // First declaration of a state name wins.
            self.states.entry(name).or_insert(list);
        }
    }

    fn finish(mut self) -> AnimationDocument {
        self.close_state();
        AnimationDocument {
            states: self.states,
            legacy: self.legacy,
        }
    }
}

/// Finds `key="value"` (or `key "value"`) where `key` starts a word, so `x` never matches
/// inside `originx` or `startx`.
fn value_of<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut search_from = 0;
    while let Some(found) = line[search_from..].find(key) {
        let start = search_from + found;
        let end = start + key.len();
        search_from = end;

        let starts_word = line[..start]
            .chars()
            .next_back()
            .map_or(true, |ch| ch.is_whitespace());
        if !starts_word {
            continue;
        }

        let rest = &line[end..];
        let Some(rest) = rest.strip_prefix('=').or_else(|| rest.strip_prefix(' ')) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix('"') else {
            continue;
        };
        return rest.find('"').map(|close| &rest[..close]);
    }
    None
}

fn int_attr(line: &str, key: &str) -> Result<i32, SkipLine> {
    let Some(raw) = value_of(line, key) else {
        return Ok(0);
    };
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i32>() {
        return Ok(value);
    }
    raw.parse::<f32>()
        .map(|value| value as i32)
        .map_err(|_| SkipLine("malformed_integer"))
}

fn duration_attr(line: &str) -> Result<f32, SkipLine> {
    let Some(raw) = value_of(line, "duration") else {
        return Ok(0.0);
    };
    raw.trim()
        .parse::<f32>()
        .map(f32::abs)
        .map_err(|_| SkipLine("malformed_duration"))
}

fn bool_attr(line: &str, key: &str) -> bool {
    matches!(value_of(line, key), Some("true") | Some("1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: &str = r#"
imagePath="mega.png"
animation state="idle"
frame duration="0.1" x="0" y="0" w="40" h="50" originx="20" originy="48" flipx="0" flipy="0"
point label="buster" x="30" y="20"
frame duration="0.2" x="40" y="0" w="40" h="50" originx="20" originy="48" flipx="1" flipy="0"
blank duration="0.05"
animation state="Shoot"
frame duration="0.1" x="0" y="50" w="48" h="50" originx="24" originy="48" flipx="0" flipy="true"
"#;

    #[test]
    fn states_are_stored_uppercase() {
        let document = AnimationDocument::parse(IDLE);
        assert_eq!(document.state_names(), vec!["IDLE", "SHOOT"]);
        assert!(document.has_state("shoot"));
        assert!(document.has_state("Idle"));
    }

    #[test]
    fn frames_carry_rect_origin_and_flips() {
        let document = AnimationDocument::parse(IDLE);
        let idle = document.state("IDLE").expect("idle");
        assert_eq!(idle.frame_count(), 3);

        let second = idle.frame(1).expect("second frame");
        assert_eq!(second.rect, IntRect::new(40, 0, 40, 50));
        assert_eq!(second.origin, Vec2::new(20.0, 48.0));
        assert!(second.flip_x);
        assert!(!second.flip_y);
        assert!(idle.frame(2).expect("blank").is_blank());
        assert!((idle.total_duration() - 0.35).abs() < 1e-6);

        let shoot = document.state("shoot").expect("shoot");
        assert!(shoot.frame(0).expect("frame").flip_y);
    }

    #[test]
    fn points_attach_to_the_preceding_frame_and_are_uppercased() {
        let document = AnimationDocument::parse(IDLE);
        let idle = document.state("IDLE").expect("idle");
        assert_eq!(idle.point(0, "BUSTER"), Some(AnchorPoint { x: 30, y: 20 }));
        assert_eq!(idle.point(1, "BUSTER"), None);
    }

    #[test]
    fn single_letter_keys_do_not_match_inside_longer_keys() {
        let line = r#"frame duration="1" originx="7" x="3" flipx="1""#;
        assert_eq!(value_of(line, "x"), Some("3"));
        assert_eq!(value_of(line, "originx"), Some("7"));
        assert_eq!(value_of(r#"VERSION "1.0""#, "VERSION"), Some("1.0"));
    }

    #[test]
    fn legacy_files_use_start_coordinates_and_carried_size() {
        let data = r#"VERSION="1.0"
animation state="MOVE" width="30" height="40"
frame duration="0.5" startx="60" starty="10"
"#;
        let document = AnimationDocument::parse(data);
        assert!(document.is_legacy());
        let frame = document.state("MOVE").and_then(|list| list.frame(0)).expect("frame");
        assert_eq!(frame.rect, IntRect::new(60, 10, 30, 40));
    }

    #[test]
    fn malformed_lines_are_skipped_without_losing_the_rest() {
        let data = r#"frame duration="0.1" x="0" y="0" w="1" h="1"
animation state="A"
frame duration="abc" x="0" y="0" w="1" h="1"
frame duration="0.1" x="zz" y="0" w="1" h="1"
frame duration="0.25" x="1" y="2" w="3" h="4"
"#;
        let document = AnimationDocument::parse(data);
        let list = document.state("A").expect("state");
        assert_eq!(list.frame_count(), 1);
        assert_eq!(list.frame(0).expect("frame").rect, IntRect::new(1, 2, 3, 4));
    }

    #[test]
    fn negative_durations_are_stored_as_absolute_values() {
        let data = "animation state=\"A\"\nframe duration=\"-5\" x=\"0\" y=\"0\" w=\"1\" h=\"1\"\nblank duration=\"-2\"\n";
        let document = AnimationDocument::parse(data);
        let list = document.state("A").expect("state");
        assert_eq!(list.frame(0).expect("frame").duration, 5.0);
        assert_eq!(list.frame(1).expect("blank").duration, 2.0);
    }

    #[test]
    fn first_declaration_of_a_duplicate_state_wins() {
        let data = "animation state=\"A\"\nblank duration=\"1\"\nanimation state=\"a\"\nblank duration=\"2\"\nblank duration=\"3\"\n";
        let document = AnimationDocument::parse(data);
        assert_eq!(document.state("A").expect("state").frame_count(), 1);
    }

    #[test]
    fn frame_index_follows_cumulative_durations() {
        let document = AnimationDocument::parse(IDLE);
        let idle = document.state("IDLE").expect("idle");
        assert_eq!(idle.frame_index_at(0.0), Some(0));
        assert_eq!(idle.frame_index_at(0.15), Some(1));
        assert_eq!(idle.frame_index_at(0.32), Some(2));
        assert_eq!(idle.frame_index_at(10.0), Some(2));
        assert!((idle.start_of(2) - 0.3).abs() < 1e-6);
    }
}
