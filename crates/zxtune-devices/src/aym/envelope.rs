//! AYM envelope generator
//!
//! The envelope is a 5-bit level (0..=31) moving by one step per envelope period.
//! Writing R13 restarts it: attack shapes (bit 2 set) start at 0 climbing, the
//! others start at 31 falling. When the level leaves the 0..=31 range the shape
//! decides what happens next, see [`Overflow`].

use std::fmt;

/// Highest envelope level.
pub const ENVELOPE_MAX: u32 = 31;

/// Envelope Shape Control - Register R13
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeShape {
    /// 0000: `\___` decay once, then silence
    #[default]
    Decay0 = 0x00,
    /// 0001: `\___`
    Decay1 = 0x01,
    /// 0010: `\___`
    Decay2 = 0x02,
    /// 0011: `\___`
    Decay3 = 0x03,
    /// 0100: `/___` attack once, then silence
    Attack0 = 0x04,
    /// 0101: `/___`
    Attack1 = 0x05,
    /// 0110: `/___`
    Attack2 = 0x06,
    /// 0111: `/___`
    Attack3 = 0x07,
    /// 1000: `\\\\` repeating sawtooth down
    SawtoothDown = 0x08,
    /// 1001: `\___`
    DecayHoldLow = 0x09,
    /// 1010: `\/\/` repeating triangle starting high
    TriangleDown = 0x0A,
    /// 1011: `\‾‾‾` decay once, then hold high
    DecayHoldHigh = 0x0B,
    /// 1100: `////` repeating sawtooth up
    SawtoothUp = 0x0C,
    /// 1101: `/‾‾‾` attack once, then hold high
    AttackHoldHigh = 0x0D,
    /// 1110: `/\/\` repeating triangle starting low
    TriangleUp = 0x0E,
    /// 1111: `/___`
    AttackHoldLow = 0x0F,
}

/// What the generator does when the level leaves 0..=31.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// Level and direction drop to zero.
    Stop,
    /// Level wraps around, keeping direction.
    Wrap,
    /// Direction flips.
    Reverse,
    /// Level holds at maximum.
    HoldHigh,
}

impl EnvelopeShape {
    /// Create from raw register value
    pub fn from_value(val: u8) -> Self {
        match val & 0x0F {
            0x00 => EnvelopeShape::Decay0,
            0x01 => EnvelopeShape::Decay1,
            0x02 => EnvelopeShape::Decay2,
            0x03 => EnvelopeShape::Decay3,
            0x04 => EnvelopeShape::Attack0,
            0x05 => EnvelopeShape::Attack1,
            0x06 => EnvelopeShape::Attack2,
            0x07 => EnvelopeShape::Attack3,
            0x08 => EnvelopeShape::SawtoothDown,
            0x09 => EnvelopeShape::DecayHoldLow,
            0x0A => EnvelopeShape::TriangleDown,
            0x0B => EnvelopeShape::DecayHoldHigh,
            0x0C => EnvelopeShape::SawtoothUp,
            0x0D => EnvelopeShape::AttackHoldHigh,
            0x0E => EnvelopeShape::TriangleUp,
            _ => EnvelopeShape::AttackHoldLow,
        }
    }

    /// Shape starts with a rising level.
    pub fn is_attack(&self) -> bool {
        (*self as u8) & 0x04 != 0
    }

    /// Behaviour once the level runs out of range.
    pub fn overflow(&self) -> Overflow {
        match self {
            EnvelopeShape::SawtoothDown | EnvelopeShape::SawtoothUp => Overflow::Wrap,
            EnvelopeShape::TriangleDown | EnvelopeShape::TriangleUp => Overflow::Reverse,
            EnvelopeShape::DecayHoldHigh | EnvelopeShape::AttackHoldHigh => Overflow::HoldHigh,
            _ => Overflow::Stop,
        }
    }
}

impl fmt::Display for EnvelopeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pattern = match self.overflow() {
            Overflow::Wrap if self.is_attack() => "////",
            Overflow::Wrap => "\\\\\\\\",
            Overflow::Reverse if self.is_attack() => "/\\/\\",
            Overflow::Reverse => "\\/\\/",
            Overflow::HoldHigh if self.is_attack() => "/‾‾‾",
            Overflow::HoldHigh => "\\‾‾‾",
            Overflow::Stop if self.is_attack() => "/___",
            Overflow::Stop => "\\___",
        };
        write!(f, "{:X} {}", *self as u8, pattern)
    }
}

/// Envelope level state machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeGenerator {
    level: u32,
    decay: i32,
    shape: EnvelopeShape,
}

impl EnvelopeGenerator {
    /// Restart with a new shape.
    #[inline]
    pub fn restart(&mut self, shape: EnvelopeShape) {
        self.shape = shape;
        if shape.is_attack() {
            self.level = 0;
            self.decay = 1;
        } else {
            self.level = ENVELOPE_MAX;
            self.decay = -1;
        }
    }

    /// Advance by one envelope period.
    #[inline]
    pub fn step(&mut self) {
        self.level = self.level.wrapping_add(self.decay as u32);
        if self.level & !ENVELOPE_MAX == 0 {
            return;
        }
        match self.shape.overflow() {
            Overflow::Stop => {
                self.level = 0;
                self.decay = 0;
            }
            Overflow::Wrap => self.level &= ENVELOPE_MAX,
            Overflow::Reverse => {
                self.decay = -self.decay;
                self.level = self.level.wrapping_add(self.decay as u32);
            }
            Overflow::HoldHigh => {
                self.level = ENVELOPE_MAX;
                self.decay = 0;
            }
        }
    }

    /// Current level, 0..=31.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Power-on state: level 0, not moving.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
