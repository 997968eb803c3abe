//! Generic player driving a frame renderer against a chip.

use log::debug;
use zxtune_common::{Information, PlaybackState, Player};
use zxtune_devices::sound::{ChannelState, Receiver, RenderParameters};
use zxtune_devices::{aym, dac, Chip};

use super::model::TrackModel;
use super::sequencer::{Sequencer, TrackState};

/// Chip chunk that can be created for a tick and layered over another one.
pub trait TickChunk: Default + Send {
    /// Set the tick the chunk renders until.
    fn set_tick(&mut self, tick: u64);
    /// Overlay `newer` on top of `self`.
    fn merge(&mut self, newer: &Self);
}

impl TickChunk for aym::DataChunk {
    fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    fn merge(&mut self, newer: &Self) {
        for reg in aym::Register::ALL {
            if let Some(value) = newer.get(reg) {
                self.set(reg, value);
            }
        }
        if newer.beeper.is_some() {
            self.beeper = newer.beeper;
        }
    }
}

impl TickChunk for dac::DataChunk {
    fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    fn merge(&mut self, newer: &Self) {
        self.channels.extend_from_slice(&newer.channels);
    }
}

/// Per-frame synthesis of chip registers from the sequencer position.
///
/// On a line start the renderer applies the line updates, then (every frame)
/// computes the chip state into `chunk`.
pub trait FrameRenderer: Send {
    /// Chunk type of the driven chip.
    type Chunk: TickChunk;

    /// Play order and timing of the module.
    fn model(&self) -> &dyn TrackModel;

    /// Fill `chunk` for the frame at `state`.
    fn synthesize(&mut self, state: &TrackState, chunk: &mut Self::Chunk);

    /// Initial channel state.
    fn reset(&mut self);
}

/// [`Player`] over a tracked module.
pub struct TrackPlayer<R: FrameRenderer, D: Chip<Chunk = R::Chunk>> {
    info: Information,
    renderer: R,
    device: D,
    sequencer: Sequencer,
    state: PlaybackState,
    tick: u64,
    frame: usize,
    finished: bool,
    flushed: bool,
    carry: Option<R::Chunk>,
}

impl<R, D> TrackPlayer<R, D>
where
    R: FrameRenderer,
    D: Chip<Chunk = R::Chunk>,
{
    /// Player at the first frame. Frame statistics of `info` are filled in.
    pub fn new(mut info: Information, renderer: R, device: D) -> Self {
        let model = renderer.model();
        let time = Sequencer::time_info(model);
        let stats = &mut info.statistics;
        stats.positions = model.positions_count();
        stats.patterns = model.patterns_count();
        stats.channels = model.channels_count();
        stats.tempo = model.initial_tempo();
        stats.loop_position = model.loop_position();
        stats.frames = time.frames;
        stats.loop_frame = time.loop_frame;
        debug!("{} frames, loop at {}", time.frames, time.loop_frame);
        let sequencer = Sequencer::new(model);
        let mut player = Self {
            info,
            renderer,
            device,
            sequencer,
            state: PlaybackState::Stopped,
            tick: 0,
            frame: 0,
            finished: false,
            flushed: false,
            carry: None,
        };
        player.reset();
        player
    }

    /// Sequencer coordinates of the next frame.
    pub fn track_state(&self) -> &TrackState {
        self.sequencer.state()
    }

    /// Underlying chip.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Underlying renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

impl<R, D> Player for TrackPlayer<R, D>
where
    R: FrameRenderer,
    D: Chip<Chunk = R::Chunk>,
{
    fn information(&self) -> &Information {
        &self.info
    }

    fn render_frame(&mut self, params: &RenderParameters, receiver: &mut dyn Receiver) -> PlaybackState {
        if self.finished {
            if !self.flushed {
                receiver.flush();
                self.flushed = true;
            }
            self.state = PlaybackState::Stopped;
            return self.state;
        }
        self.tick += params.clocks_per_frame();
        let mut chunk = R::Chunk::default();
        self.renderer.synthesize(self.sequencer.state(), &mut chunk);
        if let Some(mut carry) = self.carry.take() {
            carry.merge(&chunk);
            chunk = carry;
        }
        chunk.set_tick(self.tick);
        self.device.render_data(params, &chunk, receiver);
        self.frame += 1;
        if !self.sequencer.advance(self.renderer.model(), params.looped) {
            debug!("end of module at frame {}", self.frame);
            self.finished = true;
        }
        self.state = PlaybackState::Playing;
        self.state
    }

    fn reset(&mut self) -> PlaybackState {
        self.renderer.reset();
        self.sequencer.reset(self.renderer.model());
        self.device.reset();
        self.tick = 0;
        self.frame = 0;
        self.finished = false;
        self.flushed = false;
        self.carry = None;
        self.state = PlaybackState::Stopped;
        self.state
    }

    fn set_position(&mut self, frame: usize) -> PlaybackState {
        self.reset();
        let mut carry = R::Chunk::default();
        while self.frame < frame && !self.finished {
            let mut chunk = R::Chunk::default();
            self.renderer.synthesize(self.sequencer.state(), &mut chunk);
            carry.merge(&chunk);
            self.frame += 1;
            if !self.sequencer.advance(self.renderer.model(), false) {
                self.finished = true;
            }
        }
        self.carry = Some(carry);
        self.state = if self.finished {
            PlaybackState::Stopped
        } else {
            PlaybackState::Playing
        };
        self.state
    }

    fn state(&self) -> PlaybackState {
        self.state
    }

    fn current_frame(&self) -> usize {
        self.frame
    }

    fn channels_state(&self) -> Vec<ChannelState> {
        self.device.get_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Line, ModuleData, Position};
    use zxtune_devices::aym::{AymChip, Register, REGISTERS_COUNT};
    use zxtune_devices::sound::BufferReceiver;

    const TEMPO: usize = 3;
    const LINES: usize = 4;

    /// Volume follows the line, the tone low byte counts rendered frames.
    struct CountingRenderer {
        data: ModuleData<(), ()>,
        frames: u8,
    }

    impl FrameRenderer for CountingRenderer {
        type Chunk = aym::DataChunk;

        fn model(&self) -> &dyn TrackModel {
            &self.data
        }

        fn synthesize(&mut self, state: &TrackState, chunk: &mut aym::DataChunk) {
            if state.is_line_start() {
                chunk.set(Register::VolumeA, 15 - state.line as u8);
                chunk.set(Register::Mixer, 0x3E);
            }
            chunk.set(Register::ToneALo, self.frames);
            self.frames += 1;
        }

        fn reset(&mut self) {
            self.frames = 0;
        }
    }

    fn player() -> TrackPlayer<CountingRenderer, AymChip> {
        let data = ModuleData {
            positions: vec![Position::new(0)],
            loop_position: 0,
            initial_tempo: TEMPO,
            patterns: vec![(0..LINES).map(|_| Line::new(1)).collect()],
            samples: Vec::new(),
            ornaments: Vec::new(),
            channels: 1,
        };
        let renderer = CountingRenderer { data, frames: 0 };
        TrackPlayer::new(Information::new(), renderer, AymChip::new())
    }

    fn registers_per_frame(player: &mut TrackPlayer<CountingRenderer, AymChip>) -> Vec<[u8; REGISTERS_COUNT]> {
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        let mut dumps = Vec::new();
        while player.render_frame(&params, &mut out) == PlaybackState::Playing {
            dumps.push(player.device().dump_registers());
        }
        dumps
    }

    #[test]
    fn test_statistics() {
        let player = player();
        let stats = &player.information().statistics;
        assert_eq!(stats.frames, TEMPO * LINES);
        assert_eq!(stats.positions, 1);
        assert_eq!(stats.tempo, TEMPO);
        assert_eq!(player.state(), PlaybackState::Stopped);
    }

    #[test]
    fn test_seek_matches_linear_playback() {
        let linear = registers_per_frame(&mut player());
        assert_eq!(linear.len(), TEMPO * LINES);
        for target in [0, 1, 5, 7, TEMPO * LINES - 1] {
            let mut seeking = player();
            assert_eq!(seeking.set_position(target), PlaybackState::Playing);
            assert_eq!(seeking.current_frame(), target);
            let rest = registers_per_frame(&mut seeking);
            assert_eq!(rest.as_slice(), &linear[target..], "seek to {target}");
        }
    }

    #[test]
    fn test_seek_past_end_stops() {
        let mut player = player();
        assert_eq!(player.set_position(100), PlaybackState::Stopped);
        assert_eq!(player.current_frame(), TEMPO * LINES);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let fresh = player();
        let mut used = player();
        let params = RenderParameters::default();
        let mut out = BufferReceiver::default();
        for _ in 0..5 {
            used.render_frame(&params, &mut out);
        }
        assert_ne!(used.device().dump_registers(), fresh.device().dump_registers());

        for _ in 0..2 {
            assert_eq!(used.reset(), PlaybackState::Stopped);
            assert_eq!(used.current_frame(), 0);
            assert_eq!(used.track_state(), fresh.track_state());
            assert_eq!(used.device().dump_registers(), fresh.device().dump_registers());
            assert_eq!(used.channels_state(), fresh.channels_state());
            assert_eq!(used.renderer().frames, fresh.renderer().frames);
        }
        assert_eq!(registers_per_frame(&mut used), registers_per_frame(&mut player()));
    }
}
