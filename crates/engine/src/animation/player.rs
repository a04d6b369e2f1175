use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::document::{AnchorPoint, AnimationDocument, Frame, FrameList};
use super::AnimationLoadError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackMode {
    #[default]
    Once,
    Loop,
    Bounce,
}

/// Things that happened during one `update`, in the order they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationEvent {
    FrameReached { frame: usize },
    Looped,
    Finished,
    Interrupted,
}

#[derive(Debug, Clone, Copy)]
struct FrameTrigger {
    frame: usize,
    fired: bool,
}

/// Drives one sprite through the states of an [`AnimationDocument`].
#[derive(Debug, Clone)]
pub struct Animation {
    path: Option<PathBuf>,
    document: AnimationDocument,
    current: String,
    missing: bool,
    progress: f64,
    speed: f64,
    mode: PlaybackMode,
    triggers: Vec<FrameTrigger>,
    finish_armed: bool,
    interrupt_armed: bool,
    finished: bool,
}

impl Default for Animation {
    fn default() -> Self {
        Self::from_document(AnimationDocument::default())
    }
}

impl Animation {
    pub fn from_document(document: AnimationDocument) -> Self {
        Self {
            path: None,
            document,
            current: String::new(),
            missing: false,
            progress: 0.0,
            speed: 1.0,
            mode: PlaybackMode::Once,
            triggers: Vec::new(),
            finish_armed: false,
            interrupt_armed: false,
            finished: false,
        }
    }

    pub fn from_data(data: &str) -> Self {
        Self::from_document(AnimationDocument::parse(data))
    }

    pub fn open(path: &Path) -> Result<Self, AnimationLoadError> {
        let mut animation = Self::default();
        animation.load(path)?;
        Ok(animation)
    }

    /// Replaces every frame list with the contents of `path`; the current state name is kept.
    pub fn load(&mut self, path: &Path) -> Result<(), AnimationLoadError> {
        let data = fs::read_to_string(path).map_err(|source| AnimationLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.path = Some(path.to_path_buf());
        self.load_with_data(&data);
        Ok(())
    }

    pub fn reload(&mut self) -> Result<(), AnimationLoadError> {
        match self.path.clone() {
            Some(path) => self.load(&path),
            None => Ok(()),
        }
    }

    pub fn load_with_data(&mut self, data: &str) {
        self.replace_document(AnimationDocument::parse(data));
    }

    pub fn replace_document(&mut self, document: AnimationDocument) {
        self.document = document;
        self.progress = 0.0;
        self.finished = false;
        self.missing = !self.current.is_empty() && !self.document.has_state(&self.current);
    }

    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn document(&self) -> &AnimationDocument {
        &self.document
    }

    /// Switches state and rewinds. Armed frame triggers are dropped; an armed interrupt fires
    /// when the previous state had not run to its end.
    pub fn set_state(&mut self, state: &str) -> Option<AnimationEvent> {
        let interrupted = self.take_interrupt();
        self.current = state.to_ascii_uppercase();
        self.progress = 0.0;
        self.finished = false;
        self.finish_armed = false;
        self.triggers.clear();
        self.missing = !self.document.has_state(&self.current);
        if self.missing {
            debug!(state = %self.current, "animation_state_missing");
        }
        interrupted
    }

    pub fn current_state(&self) -> &str {
        &self.current
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.document.has_state(state)
    }

    pub fn state_duration(&self, state: &str) -> f64 {
        self.document
            .state(state)
            .map_or(0.0, FrameList::total_duration)
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn set_playback_speed(&mut self, speed: f64) {
        self.speed = speed.abs();
    }

    pub fn on_frame(&mut self, frame: usize) {
        self.triggers.push(FrameTrigger { frame, fired: false });
    }

    pub fn on_finish(&mut self) {
        self.finish_armed = true;
    }

    pub fn on_interrupt(&mut self) {
        self.interrupt_armed = true;
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn update(&mut self, elapsed: f64) -> Vec<AnimationEvent> {
        let mut events = Vec::new();
        if self.missing || self.current.is_empty() {
            return events;
        }
        let total = self.state_duration(&self.current);
        self.progress += elapsed * self.speed;
        if total <= 0.0 {
            return events;
        }

        let span = match self.mode {
            PlaybackMode::Bounce => total * 2.0,
            PlaybackMode::Once | PlaybackMode::Loop => total,
        };

        match self.mode {
            PlaybackMode::Once => {
                self.fire_triggers(&mut events);
                if self.progress >= total && !self.finished {
                    self.finished = true;
                    if std::mem::take(&mut self.finish_armed) {
                        events.push(AnimationEvent::Finished);
                    }
                }
            }
            PlaybackMode::Loop | PlaybackMode::Bounce => {
                self.fire_triggers(&mut events);
                if self.progress >= span {
                    self.progress %= span;
                    for trigger in &mut self.triggers {
                        trigger.fired = false;
                    }
                    events.push(AnimationEvent::Looped);
                    if std::mem::take(&mut self.finish_armed) {
                        events.push(AnimationEvent::Finished);
                    }
                    self.fire_triggers(&mut events);
                }
            }
        }
        events
    }

    /// Jumps to the start of `frame`; indexes past the end land on the last frame.
    pub fn set_frame(&mut self, frame: usize) {
        let Some(list) = self.document.state(&self.current) else {
            return;
        };
        if list.is_empty() {
            return;
        }
        let index = frame.min(list.frame_count() - 1);
        self.progress = list.start_of(index);
        self.finished = false;
        for trigger in &mut self.triggers {
            trigger.fired = trigger.frame < index;
        }
    }

    pub fn sync_time(&mut self, time: f64) {
        self.progress = time.max(0.0);
        let total = self.state_duration(&self.current);
        if self.mode == PlaybackMode::Loop && total > 0.0 {
            self.progress %= total;
        }
    }

    /// Makes `other` show the same state at the same time as `self`.
    pub fn sync_to(&self, other: &mut Animation) {
        if other.current != self.current {
            other.set_state(&self.current);
        }
        other.progress = self.progress;
        other.mode = self.mode;
    }

    pub fn current_frame_index(&self) -> Option<usize> {
        let list = self.current_list()?;
        list.frame_index_at(self.effective_progress(list.total_duration()))
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        let list = self.current_list()?;
        list.frame(self.current_frame_index()?)
    }

    pub fn point(&self, name: &str) -> Option<AnchorPoint> {
        let list = self.current_list()?;
        list.point(self.current_frame_index()?, &name.to_ascii_uppercase())
    }

    fn current_list(&self) -> Option<&FrameList> {
        if self.missing {
            return None;
        }
        self.document.state(&self.current)
    }

    fn effective_progress(&self, total: f64) -> f64 {
        match self.mode {
            PlaybackMode::Bounce if self.progress > total => (total * 2.0 - self.progress).max(0.0),
            _ => self.progress,
        }
    }

    fn fire_triggers(&mut self, events: &mut Vec<AnimationEvent>) {
        let Some(current) = self.current_frame_index() else {
            return;
        };
        for trigger in &mut self.triggers {
            if !trigger.fired && trigger.frame <= current {
                trigger.fired = true;
                events.push(AnimationEvent::FrameReached {
                    frame: trigger.frame,
                });
            }
        }
    }

    fn take_interrupt(&mut self) -> Option<AnimationEvent> {
        if !std::mem::take(&mut self.interrupt_armed) {
            return None;
        }
        let total = self.state_duration(&self.current);
        (self.progress < total).then_some(AnimationEvent::Interrupted)
    }
}
