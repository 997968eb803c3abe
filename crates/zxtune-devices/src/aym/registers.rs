//! AYM register map
//!
//! Defines the 14 sound registers (R0-R13), the write masks applied by the chip
//! and [`DataChunk`], the partial register snapshot exchanged between a
//! sequencer and the emulator.

use bitflags::bitflags;
use std::fmt;

/// Number of sound registers.
pub const REGISTERS_COUNT: usize = 14;

/// Volume register: fixed level bits.
pub const MASK_VOL: u8 = 0x0F;
/// Volume register: envelope-driven flag.
pub const MASK_ENV: u8 = 0x10;

/// AYM register address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Channel A tone period (low byte) - R0
    ToneALo = 0x00,
    /// Channel A tone period (high nibble) - R1
    ToneAHi = 0x01,
    /// Channel B tone period (low byte) - R2
    ToneBLo = 0x02,
    /// Channel B tone period (high nibble) - R3
    ToneBHi = 0x03,
    /// Channel C tone period (low byte) - R4
    ToneCLo = 0x04,
    /// Channel C tone period (high nibble) - R5
    ToneCHi = 0x05,
    /// Noise period - R6
    ToneN = 0x06,
    /// Mixer (tone/noise disable bits) - R7
    Mixer = 0x07,
    /// Channel A volume - R8
    VolumeA = 0x08,
    /// Channel B volume - R9
    VolumeB = 0x09,
    /// Channel C volume - R10
    VolumeC = 0x0A,
    /// Envelope period (low byte) - R11
    ToneELo = 0x0B,
    /// Envelope period (high byte) - R12
    ToneEHi = 0x0C,
    /// Envelope shape - R13
    EnvelopeShape = 0x0D,
}

impl Register {
    /// All sound registers in address order.
    pub const ALL: [Register; REGISTERS_COUNT] = [
        Register::ToneALo,
        Register::ToneAHi,
        Register::ToneBLo,
        Register::ToneBHi,
        Register::ToneCLo,
        Register::ToneCHi,
        Register::ToneN,
        Register::Mixer,
        Register::VolumeA,
        Register::VolumeB,
        Register::VolumeC,
        Register::ToneELo,
        Register::ToneEHi,
        Register::EnvelopeShape,
    ];

    /// Convert a raw register number to a register, `None` for the I/O ports.
    pub fn from_addr(addr: u8) -> Option<Self> {
        Self::ALL.get(usize::from(addr & 0x0F)).copied()
    }

    /// Get the register address value
    pub fn addr(&self) -> u8 {
        *self as u8
    }

    /// Tone period low register of a channel (0..3).
    pub fn tone_lo(channel: usize) -> Self {
        Self::ALL[(channel % 3) * 2]
    }

    /// Tone period high register of a channel (0..3).
    pub fn tone_hi(channel: usize) -> Self {
        Self::ALL[(channel % 3) * 2 + 1]
    }

    /// Volume register of a channel (0..3).
    pub fn volume(channel: usize) -> Self {
        Self::ALL[Register::VolumeA as usize + channel % 3]
    }

    /// Bits kept when the chip latches a value into this register.
    pub fn write_mask(&self) -> u8 {
        match self {
            Register::ToneAHi | Register::ToneBHi | Register::ToneCHi | Register::EnvelopeShape => {
                0x0F
            }
            Register::ToneN | Register::VolumeA | Register::VolumeB | Register::VolumeC => 0x1F,
            _ => 0xFF,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::ToneALo => "Tone A Low",
            Register::ToneAHi => "Tone A High",
            Register::ToneBLo => "Tone B Low",
            Register::ToneBHi => "Tone B High",
            Register::ToneCLo => "Tone C Low",
            Register::ToneCHi => "Tone C High",
            Register::ToneN => "Noise Period",
            Register::Mixer => "Mixer",
            Register::VolumeA => "Volume A",
            Register::VolumeB => "Volume B",
            Register::VolumeC => "Volume C",
            Register::ToneELo => "Envelope Period Low",
            Register::ToneEHi => "Envelope Period High",
            Register::EnvelopeShape => "Envelope Shape",
        };
        write!(f, "R{} ({})", self.addr(), name)
    }
}

bitflags! {
    /// Registers present in a [`DataChunk`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChunkMask: u16 {
        /// R0
        const TONEA_L = 1 << 0;
        /// R1
        const TONEA_H = 1 << 1;
        /// R2
        const TONEB_L = 1 << 2;
        /// R3
        const TONEB_H = 1 << 3;
        /// R4
        const TONEC_L = 1 << 4;
        /// R5
        const TONEC_H = 1 << 5;
        /// R6
        const TONEN = 1 << 6;
        /// R7
        const MIXER = 1 << 7;
        /// R8
        const VOLA = 1 << 8;
        /// R9
        const VOLB = 1 << 9;
        /// R10
        const VOLC = 1 << 10;
        /// R11
        const TONEE_L = 1 << 11;
        /// R12
        const TONEE_H = 1 << 12;
        /// R13
        const ENV = 1 << 13;
        /// Every sound register
        const ALL_REGISTERS = (1 << 14) - 1;
    }
}

impl ChunkMask {
    /// Mask bit of a single register.
    pub fn of(reg: Register) -> Self {
        Self::from_bits_truncate(1 << reg.addr())
    }
}

bitflags! {
    /// Mixer register bits. A set bit disables the corresponding generator.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MixerFlags: u8 {
        /// Tone A off
        const TONE_A = 1 << 0;
        /// Tone B off
        const TONE_B = 1 << 1;
        /// Tone C off
        const TONE_C = 1 << 2;
        /// Noise A off
        const NOISE_A = 1 << 3;
        /// Noise B off
        const NOISE_B = 1 << 4;
        /// Noise C off
        const NOISE_C = 1 << 5;
    }
}

impl MixerFlags {
    /// Tone-off bit of a channel.
    pub fn tone(channel: usize) -> Self {
        Self::from_bits_truncate(Self::TONE_A.bits() << (channel % 3))
    }

    /// Noise-off bit of a channel.
    pub fn noise(channel: usize) -> Self {
        Self::from_bits_truncate(Self::NOISE_A.bits() << (channel % 3))
    }
}

/// Tick-stamped partial register snapshot.
///
/// Only registers flagged in `mask` are written by the chip. The chip renders up
/// to `tick` after applying the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataChunk {
    /// Absolute chip tick this chunk renders until
    pub tick: u64,
    /// Registers carried by the chunk
    pub mask: ChunkMask,
    /// Register values (only meaningful where `mask` is set)
    pub data: [u8; REGISTERS_COUNT],
    /// Optional beeper output level, rendered as a fourth channel
    pub beeper: Option<bool>,
}

impl DataChunk {
    /// Empty chunk ending at `tick`.
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// Store a register value and flag it.
    pub fn set(&mut self, reg: Register, value: u8) {
        self.data[reg as usize] = value;
        self.mask |= ChunkMask::of(reg);
    }

    /// OR bits into a register value and flag it.
    pub fn or(&mut self, reg: Register, bits: u8) {
        let value = self.get(reg).unwrap_or(0) | bits;
        self.set(reg, value);
    }

    /// Value of a register if present in the chunk.
    pub fn get(&self, reg: Register) -> Option<u8> {
        self.mask
            .contains(ChunkMask::of(reg))
            .then(|| self.data[reg as usize])
    }

    /// Store a 12-bit tone period for a channel.
    pub fn set_tone(&mut self, channel: usize, period: u16) {
        self.set(Register::tone_lo(channel), (period & 0xFF) as u8);
        self.set(Register::tone_hi(channel), (period >> 8) as u8);
    }

    /// Store the 16-bit envelope period.
    pub fn set_envelope_period(&mut self, period: u16) {
        self.set(Register::ToneELo, (period & 0xFF) as u8);
        self.set(Register::ToneEHi, (period >> 8) as u8);
    }
}
