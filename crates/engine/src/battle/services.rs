use tracing::debug;

use crate::render::{DrawCommand, DrawSurface};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MusicTrack {
    pub path: String,
    pub loop_start_ms: u32,
    pub loop_end_ms: u32,
}

impl MusicTrack {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            loop_start_ms: 0,
            loop_end_ms: 0,
        }
    }

    pub fn with_loop(mut self, start_ms: u32, end_ms: u32) -> Self {
        self.loop_start_ms = start_ms;
        self.loop_end_ms = end_ms;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SoundEffect {
    Counter,
    CounterBonus,
    CustomBarFull,
    CardConfirm,
    Hurt,
    Explode,
}

/// Fire-and-forget audio playback.
pub trait AudioSink {
    fn play_sound(&mut self, sound: SoundEffect);
    fn stream(&mut self, track: &MusicTrack);
    fn stop_stream(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FadeOut {
    White,
    Black,
    Pixelate,
}

/// The stack of activities hosting the battle scene.
pub trait ActivityController {
    fn stack_size(&self) -> usize;
    fn pop(&mut self);
    fn pop_with_fade(&mut self, fade: FadeOut);
}

pub trait Background {
    fn update(&mut self, _elapsed: f64) {}

    fn draw(&self, surface: &mut dyn DrawSurface, opacity: f32) {
        surface.draw(DrawCommand::Background { opacity });
    }
}

#[derive(Debug, Default)]
pub struct PlainBackground;

impl Background for PlainBackground {}

/// Audio sink for hosts without a sound device.
#[derive(Debug, Default)]
pub struct SilentAudio;

impl AudioSink for SilentAudio {
    fn play_sound(&mut self, sound: SoundEffect) {
        debug!(?sound, "sound_skipped");
    }

    fn stream(&mut self, track: &MusicTrack) {
        debug!(path = %track.path, "stream_skipped");
    }

    fn stop_stream(&mut self) {}
}

/// Collaborators the battle core reaches through instead of globals.
pub struct BattleServices {
    pub audio: Box<dyn AudioSink>,
    pub host: Box<dyn ActivityController>,
    pub background: Box<dyn Background>,
}

impl BattleServices {
    pub fn new(audio: Box<dyn AudioSink>, host: Box<dyn ActivityController>) -> Self {
        Self {
            audio,
            host,
            background: Box::new(PlainBackground),
        }
    }

    pub fn with_background(mut self, background: Box<dyn Background>) -> Self {
        self.background = background;
        self
    }
}

impl std::fmt::Debug for BattleServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleServices")
            .field("host_stack_size", &self.host.stack_size())
            .finish_non_exhaustive()
    }
}
