use std::cell::RefCell;
use std::rc::Rc;

use super::context::{BattleContext, BattleSceneConfig};
use super::entity::EntityId;
use super::field::Field;
use super::mob::Mob;
use super::services::{ActivityController, AudioSink, BattleServices, FadeOut, MusicTrack, SoundEffect};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AudioCall {
    Sound(SoundEffect),
    Stream(String),
    StopStream,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingAudio {
    pub(crate) calls: Rc<RefCell<Vec<AudioCall>>>,
}

impl RecordingAudio {
    pub(crate) fn sounds(&self) -> Vec<SoundEffect> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                AudioCall::Sound(sound) => Some(*sound),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn stopped(&self) -> bool {
        self.calls.borrow().contains(&AudioCall::StopStream)
    }
}

impl AudioSink for RecordingAudio {
    fn play_sound(&mut self, sound: SoundEffect) {
        self.calls.borrow_mut().push(AudioCall::Sound(sound));
    }

    fn stream(&mut self, track: &MusicTrack) {
        self.calls.borrow_mut().push(AudioCall::Stream(track.path.clone()));
    }

    fn stop_stream(&mut self) {
        self.calls.borrow_mut().push(AudioCall::StopStream);
    }
}

/// Activity stack stand-in; `pops` records `None` for a plain pop and the fade otherwise.
#[derive(Debug)]
pub(crate) struct FakeHost {
    pub(crate) stack_size: usize,
    pub(crate) pops: Rc<RefCell<Vec<Option<FadeOut>>>>,
}

impl ActivityController for FakeHost {
    fn stack_size(&self) -> usize {
        self.stack_size
    }

    fn pop(&mut self) {
        self.pops.borrow_mut().push(None);
    }

    fn pop_with_fade(&mut self, fade: FadeOut) {
        self.pops.borrow_mut().push(Some(fade));
    }
}

pub(crate) type PopLog = Rc<RefCell<Vec<Option<FadeOut>>>>;

pub(crate) fn services_with(audio: RecordingAudio, stack_size: usize) -> (BattleServices, PopLog) {
    let pops = PopLog::default();
    let host = FakeHost {
        stack_size,
        pops: pops.clone(),
    };
    (BattleServices::new(Box::new(audio), Box::new(host)), pops)
}

pub(crate) fn context_with(
    field: Field,
    mob: Mob,
    player: EntityId,
    audio: RecordingAudio,
) -> (BattleContext, PopLog) {
    let (services, pops) = services_with(audio, 2);
    let ctx = BattleContext::new(field, mob, player, services, BattleSceneConfig::default());
    (ctx, pops)
}
