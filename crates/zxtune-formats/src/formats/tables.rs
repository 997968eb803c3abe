//! Note period and volume tables of the AY trackers.
//!
//! Periods are AY tone register values for 96 notes starting at C-1.

/// Notes per table.
pub const NOTES: usize = 96;

/// Note period table.
pub type FreqTable = [u16; NOTES];

/// Period for a note, clamped into the table.
pub fn note_period(table: &FreqTable, note: i32) -> u16 {
    table[note.clamp(0, NOTES as i32 - 1) as usize]
}

/// ProTracker 2.x
pub const PROTRACKER2: FreqTable = [
    0xef8, 0xe10, 0xd60, 0xc80, 0xbd8, 0xb28, 0xa88, 0x9f0, 0x960, 0x8e0, 0x858, 0x7e0,
    0x77c, 0x708, 0x6b0, 0x640, 0x5ec, 0x594, 0x544, 0x4f8, 0x4b0, 0x470, 0x42c, 0x3fd,
    0x3be, 0x384, 0x358, 0x320, 0x2f6, 0x2ca, 0x2a2, 0x27c, 0x258, 0x238, 0x216, 0x1f8,
    0x1df, 0x1c2, 0x1ac, 0x190, 0x17b, 0x165, 0x151, 0x13e, 0x12c, 0x11c, 0x10a, 0x0fc,
    0x0ef, 0x0e1, 0x0d6, 0x0c8, 0x0bd, 0x0b2, 0x0a8, 0x09f, 0x096, 0x08e, 0x085, 0x07e,
    0x077, 0x070, 0x06b, 0x064, 0x05e, 0x059, 0x054, 0x04f, 0x04b, 0x047, 0x042, 0x03f,
    0x03b, 0x038, 0x035, 0x032, 0x02f, 0x02c, 0x02a, 0x027, 0x025, 0x023, 0x021, 0x01f,
    0x01d, 0x01c, 0x01a, 0x019, 0x017, 0x016, 0x015, 0x013, 0x012, 0x011, 0x010, 0x00f,
];

/// Sound Tracker and Sound Tracker Pro
pub const SOUNDTRACKER: FreqTable = [
    0xef8, 0xe10, 0xd60, 0xc80, 0xbd8, 0xb28, 0xa88, 0x9f0, 0x960, 0x8e0, 0x858, 0x7e0,
    0x77c, 0x708, 0x6b0, 0x640, 0x5ec, 0x594, 0x544, 0x4f8, 0x4b0, 0x470, 0x42c, 0x3f0,
    0x3be, 0x384, 0x358, 0x320, 0x2f6, 0x2ca, 0x2a2, 0x27c, 0x258, 0x238, 0x216, 0x1f8,
    0x1df, 0x1c2, 0x1ac, 0x190, 0x17b, 0x165, 0x151, 0x13e, 0x12c, 0x11c, 0x10b, 0x0fc,
    0x0ef, 0x0e1, 0x0d6, 0x0c8, 0x0bd, 0x0b2, 0x0a8, 0x09f, 0x096, 0x08e, 0x085, 0x07e,
    0x077, 0x070, 0x06b, 0x064, 0x05e, 0x059, 0x054, 0x04f, 0x04b, 0x047, 0x042, 0x03f,
    0x03b, 0x038, 0x035, 0x032, 0x02f, 0x02c, 0x02a, 0x027, 0x025, 0x023, 0x021, 0x01f,
    0x01d, 0x01c, 0x01a, 0x019, 0x017, 0x016, 0x015, 0x013, 0x012, 0x011, 0x010, 0x00f,
];

/// ASC Sound Master; the top ten notes are unused by the tracker and left at 0
pub const ASM_SOUND: FreqTable = [
    0xedc, 0xe07, 0xd3e, 0xc80, 0xbcc, 0xb22, 0xa82, 0x9ec, 0x95c, 0x8d6, 0x858, 0x7e0,
    0x76e, 0x704, 0x69f, 0x640, 0x5e6, 0x591, 0x541, 0x4f6, 0x4ae, 0x46b, 0x42c, 0x3f0,
    0x3b7, 0x382, 0x34f, 0x320, 0x2f3, 0x2c8, 0x2a1, 0x27b, 0x257, 0x236, 0x216, 0x1f8,
    0x1dc, 0x1c1, 0x1a8, 0x190, 0x179, 0x164, 0x150, 0x13d, 0x12c, 0x11b, 0x10b, 0x0fc,
    0x0ee, 0x0e0, 0x0d4, 0x0c8, 0x0bd, 0x0b2, 0x0a8, 0x09f, 0x096, 0x08d, 0x085, 0x07e,
    0x077, 0x070, 0x06a, 0x064, 0x05e, 0x059, 0x054, 0x050, 0x04b, 0x047, 0x043, 0x03f,
    0x03c, 0x038, 0x035, 0x032, 0x02f, 0x02d, 0x02a, 0x028, 0x026, 0x024, 0x022, 0x020,
    0x01e, 0x01c, 0x000, 0x000, 0x000, 0x000, 0x000, 0x000, 0x000, 0x000, 0x000, 0x000,
];

/// ProTracker 3.3x-3.4r, table #0
pub const PT3_PT_33_34R: FreqTable = [
    0xc21, 0xb73, 0xace, 0xa33, 0x9a0, 0x916, 0x893, 0x818, 0x7a4, 0x736, 0x6ce, 0x66d,
    0x610, 0x5b9, 0x567, 0x519, 0x4d0, 0x48b, 0x449, 0x40c, 0x3d2, 0x39b, 0x367, 0x336,
    0x308, 0x2dc, 0x2b3, 0x28c, 0x268, 0x245, 0x224, 0x206, 0x1e9, 0x1cd, 0x1b3, 0x19b,
    0x184, 0x16e, 0x159, 0x146, 0x134, 0x122, 0x112, 0x103, 0x0f4, 0x0e6, 0x0d9, 0x0cd,
    0x0c2, 0x0b7, 0x0ac, 0x0a3, 0x09a, 0x091, 0x089, 0x081, 0x07a, 0x073, 0x06c, 0x066,
    0x061, 0x05b, 0x056, 0x051, 0x04d, 0x048, 0x044, 0x040, 0x03d, 0x039, 0x036, 0x033,
    0x030, 0x02d, 0x02b, 0x028, 0x026, 0x024, 0x022, 0x020, 0x01e, 0x01c, 0x01b, 0x019,
    0x018, 0x016, 0x015, 0x014, 0x013, 0x012, 0x011, 0x010, 0x00f, 0x00e, 0x00d, 0x00c,
];

/// ProTracker 3.4x-3.5x, table #0
pub const PT3_PT_34_35: FreqTable = [
    0xc22, 0xb73, 0xacf, 0xa33, 0x9a1, 0x917, 0x894, 0x819, 0x7a4, 0x737, 0x6cf, 0x66d,
    0x611, 0x5ba, 0x567, 0x51a, 0x4d0, 0x48b, 0x44a, 0x40c, 0x3d2, 0x39b, 0x367, 0x337,
    0x308, 0x2dd, 0x2b4, 0x28d, 0x268, 0x246, 0x225, 0x206, 0x1e9, 0x1ce, 0x1b4, 0x19b,
    0x184, 0x16e, 0x15a, 0x146, 0x134, 0x123, 0x112, 0x103, 0x0f5, 0x0e7, 0x0da, 0x0ce,
    0x0c2, 0x0b7, 0x0ad, 0x0a3, 0x09a, 0x091, 0x089, 0x082, 0x07a, 0x073, 0x06d, 0x067,
    0x061, 0x05c, 0x056, 0x052, 0x04d, 0x049, 0x045, 0x041, 0x03d, 0x03a, 0x036, 0x033,
    0x031, 0x02e, 0x02b, 0x029, 0x027, 0x024, 0x022, 0x020, 0x01f, 0x01d, 0x01b, 0x01a,
    0x018, 0x017, 0x016, 0x014, 0x013, 0x012, 0x011, 0x010, 0x00f, 0x00e, 0x00d, 0x00c,
];

/// ProTracker 3.x, table #1 (Sound Tracker)
pub const PT3_ST: FreqTable = [
    0xef8, 0xe10, 0xd60, 0xc80, 0xbd8, 0xb28, 0xa88, 0x9f0, 0x960, 0x8e0, 0x858, 0x7e0,
    0x77c, 0x708, 0x6b0, 0x640, 0x5ec, 0x594, 0x544, 0x4f8, 0x4b0, 0x470, 0x42c, 0x3fd,
    0x3be, 0x384, 0x358, 0x320, 0x2f6, 0x2ca, 0x2a2, 0x27c, 0x258, 0x238, 0x216, 0x1f8,
    0x1df, 0x1c2, 0x1ac, 0x190, 0x17b, 0x165, 0x151, 0x13e, 0x12c, 0x11c, 0x10a, 0x0fc,
    0x0ef, 0x0e1, 0x0d6, 0x0c8, 0x0bd, 0x0b2, 0x0a8, 0x09f, 0x096, 0x08e, 0x085, 0x07e,
    0x077, 0x070, 0x06b, 0x064, 0x05e, 0x059, 0x054, 0x04f, 0x04b, 0x047, 0x042, 0x03f,
    0x03b, 0x038, 0x035, 0x032, 0x02f, 0x02c, 0x02a, 0x027, 0x025, 0x023, 0x021, 0x01f,
    0x01d, 0x01c, 0x01a, 0x019, 0x017, 0x016, 0x015, 0x013, 0x012, 0x011, 0x010, 0x00f,
];

/// ProTracker 3.4r, table #2 (ASM)
pub const PT3_ASM_34R: FreqTable = [
    0xd3e, 0xc80, 0xbcc, 0xb22, 0xa82, 0x9ec, 0x95c, 0x8d6, 0x858, 0x7e0, 0x76e, 0x704,
    0x69f, 0x640, 0x5e6, 0x591, 0x541, 0x4f6, 0x4ae, 0x46b, 0x42c, 0x3f0, 0x3b7, 0x382,
    0x34f, 0x320, 0x2f3, 0x2c8, 0x2a1, 0x27b, 0x257, 0x236, 0x216, 0x1f8, 0x1dc, 0x1c1,
    0x1a8, 0x190, 0x179, 0x164, 0x150, 0x13d, 0x12c, 0x11b, 0x10b, 0x0fc, 0x0ee, 0x0e0,
    0x0d4, 0x0c8, 0x0bd, 0x0b2, 0x0a8, 0x09f, 0x096, 0x08d, 0x085, 0x07e, 0x077, 0x070,
    0x06a, 0x064, 0x05e, 0x059, 0x054, 0x050, 0x04b, 0x047, 0x043, 0x03f, 0x03c, 0x038,
    0x035, 0x032, 0x02f, 0x02d, 0x02a, 0x028, 0x026, 0x024, 0x022, 0x020, 0x01e, 0x01d,
    0x01b, 0x01a, 0x019, 0x018, 0x015, 0x014, 0x013, 0x012, 0x011, 0x010, 0x00f, 0x00e,
];

/// ProTracker 3.4x-3.5x, table #2 (ASM)
pub const PT3_ASM_34_35: FreqTable = [
    0xd10, 0xc55, 0xba4, 0xafc, 0xa5f, 0x9ca, 0x93d, 0x8b8, 0x83b, 0x7c5, 0x755, 0x6ec,
    0x688, 0x62a, 0x5d2, 0x57e, 0x52f, 0x4e5, 0x49e, 0x45c, 0x41d, 0x3e2, 0x3ab, 0x376,
    0x344, 0x315, 0x2e9, 0x2bf, 0x298, 0x272, 0x24f, 0x22e, 0x20f, 0x1f1, 0x1d5, 0x1bb,
    0x1a2, 0x18b, 0x174, 0x160, 0x14c, 0x139, 0x128, 0x117, 0x107, 0x0f9, 0x0eb, 0x0dd,
    0x0d1, 0x0c5, 0x0ba, 0x0b0, 0x0a6, 0x09d, 0x094, 0x08c, 0x084, 0x07c, 0x075, 0x06f,
    0x069, 0x063, 0x05d, 0x058, 0x053, 0x04e, 0x04a, 0x046, 0x042, 0x03e, 0x03b, 0x037,
    0x034, 0x031, 0x02f, 0x02c, 0x029, 0x027, 0x025, 0x023, 0x021, 0x01f, 0x01d, 0x01c,
    0x01a, 0x019, 0x017, 0x016, 0x015, 0x014, 0x012, 0x011, 0x010, 0x00f, 0x00e, 0x00d,
];

/// ProTracker 3.4r, table #3 (real)
pub const PT3_REAL_34R: FreqTable = [
    0xcda, 0xc22, 0xb73, 0xacf, 0xa33, 0x9a1, 0x917, 0x894, 0x819, 0x7a4, 0x737, 0x6cf,
    0x66d, 0x611, 0x5ba, 0x567, 0x51a, 0x4d0, 0x48b, 0x44a, 0x40c, 0x3d2, 0x39b, 0x367,
    0x337, 0x308, 0x2dd, 0x2b4, 0x28d, 0x268, 0x246, 0x225, 0x206, 0x1e9, 0x1ce, 0x1b4,
    0x19b, 0x184, 0x16e, 0x15a, 0x146, 0x134, 0x123, 0x113, 0x103, 0x0f5, 0x0e7, 0x0da,
    0x0ce, 0x0c2, 0x0b7, 0x0ad, 0x0a3, 0x09a, 0x091, 0x089, 0x082, 0x07a, 0x073, 0x06d,
    0x067, 0x061, 0x05c, 0x056, 0x052, 0x04d, 0x049, 0x045, 0x041, 0x03d, 0x03a, 0x036,
    0x033, 0x031, 0x02e, 0x02b, 0x029, 0x027, 0x024, 0x022, 0x020, 0x01f, 0x01d, 0x01b,
    0x01a, 0x018, 0x017, 0x016, 0x014, 0x013, 0x012, 0x011, 0x010, 0x00f, 0x00e, 0x00d,
];

/// ProTracker 3.4x-3.5x, table #3 (real)
pub const PT3_REAL_34_35: FreqTable = [
    0xcda, 0xc22, 0xb73, 0xacf, 0xa33, 0x9a1, 0x917, 0x894, 0x819, 0x7a4, 0x737, 0x6cf,
    0x66d, 0x611, 0x5ba, 0x567, 0x51a, 0x4d0, 0x48b, 0x44a, 0x40c, 0x3d2, 0x39b, 0x367,
    0x337, 0x308, 0x2dd, 0x2b4, 0x28d, 0x268, 0x246, 0x225, 0x206, 0x1e9, 0x1ce, 0x1b4,
    0x19b, 0x184, 0x16e, 0x15a, 0x146, 0x134, 0x123, 0x112, 0x103, 0x0f5, 0x0e7, 0x0da,
    0x0ce, 0x0c2, 0x0b7, 0x0ad, 0x0a3, 0x09a, 0x091, 0x089, 0x082, 0x07a, 0x073, 0x06d,
    0x067, 0x061, 0x05c, 0x056, 0x052, 0x04d, 0x049, 0x045, 0x041, 0x03d, 0x03a, 0x036,
    0x033, 0x031, 0x02e, 0x02b, 0x029, 0x027, 0x024, 0x022, 0x020, 0x01f, 0x01d, 0x01b,
    0x01a, 0x018, 0x017, 0x016, 0x014, 0x013, 0x012, 0x011, 0x010, 0x00f, 0x00e, 0x00d,
];

/// ProTracker 3.3x-3.4x volume scaling, indexed by `volume * 16 + level`
pub const PT3_VOLUME_33_34: [u8; 256] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02,
    0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03, 0x03,
    0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03, 0x04, 0x04, 0x04,
    0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x02, 0x02, 0x03, 0x03, 0x03, 0x04, 0x04, 0x04, 0x05, 0x05,
    0x00, 0x00, 0x00, 0x01, 0x01, 0x02, 0x02, 0x03, 0x03, 0x03, 0x04, 0x04, 0x05, 0x05, 0x06, 0x06,
    0x00, 0x00, 0x01, 0x01, 0x02, 0x02, 0x03, 0x03, 0x04, 0x04, 0x05, 0x05, 0x06, 0x06, 0x07, 0x07,
    0x00, 0x00, 0x01, 0x01, 0x02, 0x02, 0x03, 0x03, 0x04, 0x05, 0x05, 0x06, 0x06, 0x07, 0x07, 0x08,
    0x00, 0x00, 0x01, 0x01, 0x02, 0x03, 0x03, 0x04, 0x05, 0x05, 0x06, 0x06, 0x07, 0x08, 0x08, 0x09,
    0x00, 0x00, 0x01, 0x02, 0x02, 0x03, 0x04, 0x04, 0x05, 0x06, 0x06, 0x07, 0x08, 0x08, 0x09, 0x0a,
    0x00, 0x00, 0x01, 0x02, 0x03, 0x03, 0x04, 0x05, 0x06, 0x06, 0x07, 0x08, 0x09, 0x09, 0x0a, 0x0b,
    0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x04, 0x05, 0x06, 0x07, 0x08, 0x08, 0x09, 0x0a, 0x0b, 0x0c,
    0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d,
    0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

/// ProTracker 3.5x volume scaling, indexed by `volume * 16 + level`
pub const PT3_VOLUME_35: [u8; 256] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02,
    0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03,
    0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03, 0x03, 0x04, 0x04,
    0x00, 0x00, 0x01, 0x01, 0x01, 0x02, 0x02, 0x02, 0x03, 0x03, 0x03, 0x04, 0x04, 0x04, 0x05, 0x05,
    0x00, 0x00, 0x01, 0x01, 0x02, 0x02, 0x02, 0x03, 0x03, 0x04, 0x04, 0x04, 0x05, 0x05, 0x06, 0x06,
    0x00, 0x00, 0x01, 0x01, 0x02, 0x02, 0x03, 0x03, 0x04, 0x04, 0x05, 0x05, 0x06, 0x06, 0x07, 0x07,
    0x00, 0x01, 0x01, 0x02, 0x02, 0x03, 0x03, 0x04, 0x04, 0x05, 0x05, 0x06, 0x06, 0x07, 0x07, 0x08,
    0x00, 0x01, 0x01, 0x02, 0x02, 0x03, 0x04, 0x04, 0x05, 0x05, 0x06, 0x07, 0x07, 0x08, 0x08, 0x09,
    0x00, 0x01, 0x01, 0x02, 0x03, 0x03, 0x04, 0x05, 0x05, 0x06, 0x07, 0x07, 0x08, 0x09, 0x09, 0x0a,
    0x00, 0x01, 0x01, 0x02, 0x03, 0x04, 0x04, 0x05, 0x06, 0x07, 0x07, 0x08, 0x09, 0x0a, 0x0a, 0x0b,
    0x00, 0x01, 0x02, 0x02, 0x03, 0x04, 0x05, 0x06, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0a, 0x0b, 0x0c,
    0x00, 0x01, 0x02, 0x03, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0a, 0x0b, 0x0c, 0x0d,
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e,
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_descend() {
        for table in [&PROTRACKER2, &SOUNDTRACKER, &PT3_PT_34_35, &PT3_REAL_34R] {
            assert!(table.windows(2).all(|w| w[0] > w[1]));
        }
        assert!(ASM_SOUND[..86].windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_note_period_clamps() {
        assert_eq!(note_period(&PROTRACKER2, -5), 0xef8);
        assert_eq!(note_period(&PROTRACKER2, 200), 0x00f);
        assert_eq!(note_period(&SOUNDTRACKER, 23), 0x3f0);
    }

    #[test]
    fn test_volume_tables() {
        assert_eq!(PT3_VOLUME_35[15 * 16 + 15], 15);
        assert_eq!(PT3_VOLUME_33_34[15], 0);
        assert_eq!(PT3_VOLUME_35[8 * 16 + 1], 1);
    }
}
