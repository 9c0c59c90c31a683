//! Bit layout of the 16-bit frames exchanged with the converter.
//!
//! Outbound, the 12-bit control register sits in the top 12 bits of the frame:
//!
//! ```text
//!   15   14   13   12   11   10    9    8    7    6    5    4   3..0
//!  WRITE SEQ   -    -  ADD1 ADD0 PM1  PM0 SHDW  -  RANGE CODE  pad
//! ```
//!
//! Inbound, the converter returns two leading zeros, the two address bits of
//! the converted channel and the conversion result, MSB first. Only the top
//! eight bits of the result are used.

use crate::Channel;

/// Full-scale count of the 8-bit sample.
pub const FULL_SCALE: f32 = 256.0;
/// Reference voltage in volts.
pub const V_REF: f32 = 5.0;

/// Control register value, before alignment into the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlWord(u16);

impl ControlWord {
    const WRITE: u16 = 1 << 11;
    const SEQ: u16 = 1 << 10;
    const ADDR_SHIFT: u16 = 6;
    const ADDR_MASK: u16 = 0b11;
    const PM_NORMAL: u16 = 0b11 << 4;
    const SHADOW: u16 = 1 << 3;
    const CODING_BINARY: u16 = 1;
    /// The register occupies the top 12 bits of the frame.
    const FRAME_SHIFT: u16 = 4;

    fn address(channel: Channel) -> u16 {
        ((channel as u16) & Self::ADDR_MASK) << Self::ADDR_SHIFT
    }

    /// Convert `channel` on every subsequent read.
    pub fn single(channel: Channel) -> Self {
        ControlWord(Self::WRITE | Self::address(channel) | Self::PM_NORMAL | Self::CODING_BINARY)
    }

    /// Cycle through channels 0..=`last` on consecutive reads.
    pub fn sequence(last: Channel) -> Self {
        ControlWord(
            Self::WRITE
                | Self::SEQ
                | Self::address(last)
                | Self::PM_NORMAL
                | Self::SHADOW
                | Self::CODING_BINARY,
        )
    }

    /// Raw 12-bit register value.
    pub fn bits(self) -> u16 {
        self.0
    }

    /// The 16-bit frame to put on the wire.
    pub fn frame(self) -> u16 {
        self.0 << Self::FRAME_SHIFT
    }
}

/// One decoded response frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Sample {
    /// Channel index reported by the converter (bits 12..13).
    pub channel: u8,
    /// Top eight bits of the conversion result (bits 4..11).
    pub raw: u8,
}

impl Sample {
    const CHANNEL_SHIFT: u16 = 12;
    const CHANNEL_MASK: u16 = 0b11;
    const RAW_SHIFT: u16 = 4;
    const RAW_MASK: u16 = 0xFF;

    pub fn from_word(word: u16) -> Self {
        Sample {
            channel: ((word >> Self::CHANNEL_SHIFT) & Self::CHANNEL_MASK) as u8,
            raw: ((word >> Self::RAW_SHIFT) & Self::RAW_MASK) as u8,
        }
    }

    /// Input voltage: `raw / 256 * 5.0`.
    pub fn voltage(&self) -> f32 {
        self.raw as f32 / FULL_SCALE * V_REF
    }
}
