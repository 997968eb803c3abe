/// Per-channel update of one pattern line.
///
/// `None` keeps the channel state, `Some` overwrites it (including zero).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chan<C> {
    /// Channel on/off
    pub enabled: Option<bool>,
    /// Note index
    pub note: Option<usize>,
    /// Sample index
    pub sample: Option<usize>,
    /// Ornament index
    pub ornament: Option<usize>,
    /// Channel volume
    pub volume: Option<u8>,
    /// Format-specific effects, in stream order
    pub commands: Vec<C>,
}

impl<C> Default for Chan<C> {
    fn default() -> Self {
        Self {
            enabled: None,
            note: None,
            sample: None,
            ornament: None,
            volume: None,
            commands: Vec::new(),
        }
    }
}

impl<C> Chan<C> {
    /// True when the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.note.is_none()
            && self.sample.is_none()
            && self.ornament.is_none()
            && self.volume.is_none()
            && self.commands.is_empty()
    }

    /// First command matching `pred`.
    pub fn find_command(&mut self, pred: impl Fn(&C) -> bool) -> Option<&mut C> {
        self.commands.iter_mut().find(|c| pred(c))
    }
}

/// One pattern row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line<C> {
    /// Frames per line from this line on
    pub tempo: Option<usize>,
    /// Channel updates
    pub channels: Vec<Chan<C>>,
}

impl<C> Line<C> {
    /// Empty line for `channels` channels.
    pub fn new(channels: usize) -> Self {
        Self {
            tempo: None,
            channels: (0..channels).map(|_| Chan::default()).collect(),
        }
    }
}

/// Ordered rows.
pub type Pattern<C> = Vec<Line<C>>;

/// Entry of the play order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    /// Pattern index
    pub pattern: usize,
    /// Halftone shift applied to every note
    pub transposition: i32,
}

impl Position {
    /// Position without transposition.
    pub fn new(pattern: usize) -> Self {
        Self {
            pattern,
            transposition: 0,
        }
    }
}

/// Cyclic note offsets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ornament {
    /// Index to restart from after the last entry
    pub loop_pos: usize,
    /// Halftone offsets
    pub lines: Vec<i32>,
}

impl Ornament {
    /// Ornament with a loop point, clamped into the data.
    pub fn new(loop_pos: usize, lines: Vec<i32>) -> Self {
        let loop_pos = loop_pos.min(lines.len().saturating_sub(1));
        Self { loop_pos, lines }
    }

    /// Offset at `pos`; 0 outside the data.
    pub fn get(&self, pos: usize) -> i32 {
        self.lines.get(pos).copied().unwrap_or(0)
    }

    /// Position following `pos`, wrapping to the loop point.
    pub fn next_pos(&self, pos: usize) -> usize {
        if pos + 1 >= self.lines.len() {
            self.loop_pos
        } else {
            pos + 1
        }
    }
}

/// Play order and timing, as seen by the sequencer.
pub trait TrackModel {
    /// Number of play order entries.
    fn positions_count(&self) -> usize;
    /// Pattern played at `position`.
    fn position_pattern(&self, position: usize) -> usize;
    /// Position to jump to after the last one.
    fn loop_position(&self) -> usize;
    /// Frames per line at start.
    fn initial_tempo(&self) -> usize;
    /// Lines in `pattern`, at least 1.
    fn pattern_size(&self, pattern: usize) -> usize;
    /// Tempo override of a line.
    fn line_tempo(&self, pattern: usize, line: usize) -> Option<usize>;
    /// Number of distinct patterns.
    fn patterns_count(&self) -> usize;
    /// Channels per line.
    fn channels_count(&self) -> usize;
}

/// Decoded tracker module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleData<C, S> {
    /// Play order
    pub positions: Vec<Position>,
    /// Index into `positions`
    pub loop_position: usize,
    /// Frames per line
    pub initial_tempo: usize,
    /// Patterns by index
    pub patterns: Vec<Pattern<C>>,
    /// Format-specific samples by index
    pub samples: Vec<S>,
    /// Ornaments by index
    pub ornaments: Vec<Ornament>,
    /// Channels per line
    pub channels: usize,
}

impl<C, S> ModuleData<C, S> {
    /// Line of the pattern, `None` past its end.
    pub fn line(&self, pattern: usize, line: usize) -> Option<&Line<C>> {
        self.patterns.get(pattern)?.get(line)
    }

    /// Transposition of a play order entry.
    pub fn transposition(&self, position: usize) -> i32 {
        self.positions.get(position).map_or(0, |p| p.transposition)
    }
}

impl<C, S> TrackModel for ModuleData<C, S> {
    fn positions_count(&self) -> usize {
        self.positions.len()
    }

    fn position_pattern(&self, position: usize) -> usize {
        self.positions.get(position).map_or(0, |p| p.pattern)
    }

    fn loop_position(&self) -> usize {
        self.loop_position
    }

    fn initial_tempo(&self) -> usize {
        self.initial_tempo.max(1)
    }

    fn pattern_size(&self, pattern: usize) -> usize {
        self.patterns.get(pattern).map_or(1, |p| p.len().max(1))
    }

    fn line_tempo(&self, pattern: usize, line: usize) -> Option<usize> {
        self.line(pattern, line).and_then(|l| l.tempo)
    }

    fn patterns_count(&self) -> usize {
        self.patterns.len()
    }

    fn channels_count(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ornament_wraps_to_loop() {
        let orn = Ornament::new(1, vec![0, 3, 7]);
        assert_eq!(orn.next_pos(0), 1);
        assert_eq!(orn.next_pos(2), 1);
        assert_eq!(orn.get(2), 7);
        assert_eq!(orn.get(5), 0);
    }

    #[test]
    fn test_ornament_loop_clamped() {
        let orn = Ornament::new(10, vec![1, 2]);
        assert_eq!(orn.loop_pos, 1);
        let empty = Ornament::default();
        assert_eq!(empty.next_pos(0), 0);
        assert_eq!(empty.get(0), 0);
    }

    #[test]
    fn test_empty_chan() {
        let mut chan = Chan::<u8>::default();
        assert!(chan.is_empty());
        chan.volume = Some(0);
        assert!(!chan.is_empty());
    }
}
