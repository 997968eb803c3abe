//! AYM PSG emulation
//!
//! Tick-accurate model of the AY-3-8910/YM2149. All generators run at the chip
//! clock divided by 8: each step advances the three tone counters, the noise
//! counter and the envelope counter by one. Output samples are taken whenever the
//! running tick crosses the next sample boundary.

use super::envelope::{EnvelopeGenerator, EnvelopeShape};
use super::registers::{DataChunk, MixerFlags, Register, MASK_ENV, MASK_VOL, REGISTERS_COUNT};
use super::tables::{AY_VOLUME_TABLE, SPECTRUM_TABLE, YM_VOLUME_TABLE};
use crate::sound::{ChannelState, Receiver, RenderParameters, Sample, SAMPLE_MAX, SAMPLE_MIN};
use crate::Chip;

/// Clock divisor between the chip clock and the generator step rate.
const BASE_DIVISOR: u64 = 8;

/// Gate level for generators disabled in the mixer.
const HIGH_LEVEL: u32 = !0;

/// AYM chip emulator
#[derive(Clone)]
pub struct AymChip {
    regs: [u8; REGISTERS_COUNT],
    tick: u64,
    next_sample_tick: u64,
    tone_bits: [u32; 3],
    tone_timers: [u16; 3],
    noise_bit: u32,
    noise_timer: u16,
    noise: u32,
    envelope_timer: u16,
    envelope: EnvelopeGenerator,
    clock_freq: u64,
}

impl AymChip {
    /// Create a chip in power-on state.
    pub fn new() -> Self {
        let mut chip = Self {
            regs: [0; REGISTERS_COUNT],
            tick: 0,
            next_sample_tick: 0,
            tone_bits: [0; 3],
            tone_timers: [0; 3],
            noise_bit: 0,
            noise_timer: 0,
            noise: 0,
            envelope_timer: 0,
            envelope: EnvelopeGenerator::default(),
            clock_freq: 0,
        };
        chip.reset();
        chip
    }

    /// Latch a register value, applying the hardware write mask.
    ///
    /// Writing the envelope shape restarts the envelope generator.
    pub fn write_register(&mut self, reg: Register, value: u8) {
        let value = value & reg.write_mask();
        if reg == Register::EnvelopeShape {
            self.envelope_timer = 0;
            self.envelope.restart(EnvelopeShape::from_value(value));
        }
        self.regs[reg as usize] = value;
    }

    /// Current value of a register.
    pub fn read_register(&self, reg: Register) -> u8 {
        self.regs[reg as usize]
    }

    /// Snapshot of all sound registers.
    pub fn dump_registers(&self) -> [u8; REGISTERS_COUNT] {
        self.regs
    }

    /// Current chip tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn apply_chunk(&mut self, chunk: &DataChunk) {
        for reg in Register::ALL {
            if let Some(value) = chunk.get(reg) {
                self.write_register(reg, value);
            }
        }
    }

    #[inline]
    fn tone_period(&self, channel: usize) -> u16 {
        (u16::from(self.regs[Register::tone_hi(channel) as usize]) << 8)
            | u16::from(self.regs[Register::tone_lo(channel) as usize])
    }

    #[inline]
    fn noise_period(&self) -> u16 {
        2 * u16::from(self.regs[Register::ToneN as usize])
    }

    #[inline]
    fn envelope_period(&self) -> u16 {
        (u16::from(self.regs[Register::ToneEHi as usize]) << 8)
            | u16::from(self.regs[Register::ToneELo as usize])
    }

    /// Spectrum band of a tone generator period.
    fn band_by_period(&self, period: u16) -> usize {
        let freq = self.clock_freq * 100 / (16 * u64::from(period.max(1)));
        SPECTRUM_TABLE
            .partition_point(|&f| u64::from(f) < freq)
            .min(SPECTRUM_TABLE.len() - 1)
    }

    #[inline]
    fn mixer(&self) -> MixerFlags {
        MixerFlags::from_bits_truncate(self.regs[Register::Mixer as usize])
    }

    /// Effective volume index of a channel: tone, noise and volume inputs ANDed.
    ///
    /// Generators disabled in the mixer contribute a constant high level.
    #[inline]
    fn gate(&self, channel: usize) -> usize {
        let mixer = self.mixer();
        let tone = if mixer.contains(MixerFlags::tone(channel)) {
            HIGH_LEVEL
        } else {
            self.tone_bits[channel]
        };
        let noise = if mixer.contains(MixerFlags::noise(channel)) {
            HIGH_LEVEL
        } else {
            self.noise_bit
        };
        let vol = self.regs[Register::volume(channel) as usize];
        let volume = if vol & MASK_ENV != 0 {
            self.envelope.level()
        } else {
            (u32::from(vol & MASK_VOL) << 1) + 1
        };
        (tone & noise & volume) as usize & 0x1F
    }

    #[inline]
    fn step(&mut self) {
        for chan in 0..3 {
            self.tone_timers[chan] = self.tone_timers[chan].wrapping_add(1);
            if self.tone_timers[chan] >= self.tone_period(chan) {
                self.tone_timers[chan] = 0;
                self.tone_bits[chan] = !self.tone_bits[chan];
            }
        }
        self.noise_timer = self.noise_timer.wrapping_add(1);
        if self.noise_timer >= self.noise_period() {
            self.noise_timer = 0;
            self.noise = (self.noise.wrapping_mul(2) + 1) ^ (((self.noise >> 16) ^ (self.noise >> 13)) & 1);
            self.noise_bit = if self.noise & 0x10000 != 0 { HIGH_LEVEL } else { 0 };
        }
        self.envelope_timer = self.envelope_timer.wrapping_add(1);
        if self.envelope_timer >= self.envelope_period() {
            self.envelope_timer = 0;
            self.envelope.step();
        }
    }

    fn render_until(&mut self, params: &RenderParameters, until: u64, beeper: Option<bool>, dst: &mut dyn Receiver) {
        let ticks_per_sample = params.ticks_per_sample();
        let table = if params.is_ym() {
            &YM_VOLUME_TABLE
        } else {
            &AY_VOLUME_TABLE
        };
        if self.next_sample_tick <= self.tick {
            self.next_sample_tick = self.tick + ticks_per_sample;
        }
        let mut result: [Sample; 4] = [SAMPLE_MIN; 4];
        let channels = if beeper.is_some() { 4 } else { 3 };
        result[3] = if beeper == Some(true) { SAMPLE_MAX } else { SAMPLE_MIN };
        while self.tick < until {
            if self.tick >= self.next_sample_tick {
                for chan in 0..3 {
                    result[chan] = table[self.gate(chan)];
                }
                dst.apply_sample(&result[..channels]);
                self.next_sample_tick += ticks_per_sample;
            }
            self.tick += BASE_DIVISOR;
            self.step();
        }
    }
}

impl Default for AymChip {
    fn default() -> Self {
        Self::new()
    }
}

impl Chip for AymChip {
    type Chunk = DataChunk;

    fn render_data(&mut self, params: &RenderParameters, chunk: &DataChunk, dst: &mut dyn Receiver) {
        self.clock_freq = params.clock_freq;
        self.apply_chunk(chunk);
        self.render_until(params, chunk.tick, chunk.beeper, dst);
    }

    fn reset(&mut self) {
        self.regs = [0; REGISTERS_COUNT];
        self.regs[Register::Mixer as usize] = 0xFF;
        self.tick = 0;
        self.next_sample_tick = 0;
        self.tone_bits = [0; 3];
        self.tone_timers = [0; 3];
        self.noise_bit = 0;
        self.noise_timer = 0;
        self.noise = 0;
        self.envelope_timer = 0;
        self.envelope.reset();
    }

    fn get_state(&self) -> Vec<ChannelState> {
        let mixer = self.mixer();
        (0..3)
            .map(|chan| {
                let tone_on = !mixer.contains(MixerFlags::tone(chan));
                let noise_on = !mixer.contains(MixerFlags::noise(chan));
                if !tone_on && !noise_on {
                    return ChannelState::default();
                }
                let level = u32::from(self.regs[Register::volume(chan) as usize] & MASK_VOL) * 255 / 15;
                // noise-only channels sound at the noise period
                let period = if tone_on {
                    self.tone_period(chan)
                } else {
                    self.noise_period()
                };
                ChannelState {
                    enabled: true,
                    band: Some(self.band_by_period(period)),
                    level: level as u8,
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for AymChip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AymChip")
            .field("regs", &self.regs)
            .field("tick", &self.tick)
            .field("envelope", &self.envelope.level())
            .finish()
    }
}
