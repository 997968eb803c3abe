//! Position → pattern → line → frame stepping.

use log::trace;

use super::model::TrackModel;

/// Current playback coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackState {
    /// Index into the play order
    pub position: usize,
    /// Pattern being played
    pub pattern: usize,
    /// Line inside the pattern
    pub line: usize,
    /// Frame inside the line
    pub frame: usize,
    /// Frames per line
    pub tempo: usize,
}

impl TrackState {
    /// True on the first frame of a line, when line updates apply.
    pub fn is_line_start(&self) -> bool {
        self.frame == 0
    }
}

/// Total length and loop point in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeInfo {
    /// Frames until the end of the last position
    pub frames: usize,
    /// Frame at which the loop position starts
    pub loop_frame: usize,
}

/// Frame-stepping state machine over a [`TrackModel`].
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    state: TrackState,
}

impl Sequencer {
    /// Sequencer at the first frame of `model`.
    pub fn new(model: &dyn TrackModel) -> Self {
        let mut seq = Self::default();
        seq.reset(model);
        seq
    }

    /// Current coordinates.
    pub fn state(&self) -> &TrackState {
        &self.state
    }

    /// Back to position 0 with the initial tempo.
    pub fn reset(&mut self, model: &dyn TrackModel) {
        let pattern = model.position_pattern(0);
        self.state = TrackState {
            position: 0,
            pattern,
            line: 0,
            frame: 0,
            tempo: model.initial_tempo(),
        };
        self.apply_line_tempo(model);
    }

    /// Step one frame.
    ///
    /// Returns `false` when the last frame was passed and `looped` is off; the
    /// state is then left on the last frame.
    pub fn advance(&mut self, model: &dyn TrackModel, looped: bool) -> bool {
        let mut next = self.state;
        next.frame += 1;
        if next.frame < next.tempo {
            self.state = next;
            return true;
        }
        next.frame = 0;
        next.line += 1;
        if next.line >= model.pattern_size(next.pattern) {
            next.line = 0;
            next.position += 1;
            if next.position >= model.positions_count() {
                if !looped {
                    return false;
                }
                next.position = model.loop_position().min(model.positions_count().saturating_sub(1));
                trace!("looping to position {}", next.position);
            }
            next.pattern = model.position_pattern(next.position);
        }
        self.state = next;
        self.apply_line_tempo(model);
        true
    }

    /// Dry run over the whole module.
    pub fn time_info(model: &dyn TrackModel) -> TimeInfo {
        let mut seq = Sequencer::new(model);
        let mut info = TimeInfo::default();
        let mut loop_found = false;
        loop {
            let state = seq.state;
            if !loop_found && state.position == model.loop_position() && state.line == 0 && state.frame == 0 {
                info.loop_frame = info.frames;
                loop_found = true;
            }
            info.frames += 1;
            if !seq.advance(model, false) {
                break;
            }
        }
        info
    }

    fn apply_line_tempo(&mut self, model: &dyn TrackModel) {
        if let Some(tempo) = model.line_tempo(self.state.pattern, self.state.line) {
            self.state.tempo = tempo.max(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Line, ModuleData, Position};

    fn model(sizes: &[usize], order: &[usize], tempo: usize, loop_position: usize) -> ModuleData<(), ()> {
        ModuleData {
            positions: order.iter().map(|&p| Position::new(p)).collect(),
            loop_position,
            initial_tempo: tempo,
            patterns: sizes.iter().map(|&n| vec![Line::new(3); n]).collect(),
            samples: Vec::new(),
            ornaments: Vec::new(),
            channels: 3,
        }
    }

    #[test]
    fn test_frames_and_loop_point() {
        let module = model(&[2, 3], &[0, 1, 0], 3, 1);
        let info = Sequencer::time_info(&module);
        assert_eq!(info.frames, (2 + 3 + 2) * 3);
        assert_eq!(info.loop_frame, 2 * 3);
    }

    #[test]
    fn test_advance_walks_positions() {
        let module = model(&[1, 1], &[1, 0], 2, 0);
        let mut seq = Sequencer::new(&module);
        assert_eq!(seq.state().pattern, 1);
        assert!(seq.advance(&module, false));
        assert_eq!(seq.state().frame, 1);
        assert!(seq.advance(&module, false));
        assert_eq!((seq.state().position, seq.state().pattern), (1, 0));
        assert!(seq.advance(&module, false));
        assert!(!seq.advance(&module, false));
        assert_eq!(seq.state().position, 1);
    }

    #[test]
    fn test_loop_returns_to_loop_position() {
        let module = model(&[1, 1], &[0, 1], 1, 1);
        let mut seq = Sequencer::new(&module);
        assert!(seq.advance(&module, true));
        assert!(seq.advance(&module, true));
        assert_eq!(seq.state().position, 1);
        assert_eq!(seq.state().line, 0);
    }

    #[test]
    fn test_line_tempo_override() {
        let mut module = model(&[2], &[0], 6, 0);
        module.patterns[0][1].tempo = Some(2);
        let mut seq = Sequencer::new(&module);
        for _ in 0..6 {
            assert!(seq.advance(&module, false));
        }
        assert_eq!(seq.state().line, 1);
        assert_eq!(seq.state().tempo, 2);
        assert!(seq.advance(&module, false));
        assert!(!seq.advance(&module, false));
        assert_eq!(Sequencer::time_info(&module).frames, 8);
    }
}
