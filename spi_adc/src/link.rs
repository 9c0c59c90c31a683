//! SPI link seam: the control and transfer calls the driver needs, plus the
//! Linux spidev backend.

use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use embedded_hal::spi::{Mode, Phase, Polarity};
use linux_embedded_hal::spidev::{spidevioctl, SpiModeFlags, Spidev, SpidevTransfer};

/// Mode bits as reported by the `SPI_IOC_RD_MODE` request.
const SPI_CPHA: u8 = 0x01;
const SPI_CPOL: u8 = 0x02;

/// A single transfer request. Length is implied by the buffers; when both are
/// present they must be the same length.
#[derive(Debug)]
pub struct Transfer<'a> {
    pub tx: Option<&'a [u8]>,
    pub rx: Option<&'a mut [u8]>,
    /// Deassert chip select after this transfer.
    pub cs_change: bool,
    /// Delay after the transfer before chip select changes, in microseconds.
    pub delay_usecs: u16,
}

impl<'a> Transfer<'a> {
    /// Outbound only.
    pub fn write(tx: &'a [u8]) -> Self {
        Transfer { tx: Some(tx), rx: None, cs_change: false, delay_usecs: 0 }
    }

    /// Inbound only.
    pub fn read(rx: &'a mut [u8]) -> Self {
        Transfer { tx: None, rx: Some(rx), cs_change: false, delay_usecs: 0 }
    }

    pub fn with_cs_change(mut self, cs_change: bool) -> Self {
        self.cs_change = cs_change;
        self
    }

    pub fn with_delay_usecs(mut self, delay_usecs: u16) -> Self {
        self.delay_usecs = delay_usecs;
        self
    }

    /// Number of bytes clocked by this transfer.
    pub fn len(&self) -> usize {
        match (&self.tx, &self.rx) {
            (Some(tx), _) => tx.len(),
            (None, Some(rx)) => rx.len(),
            (None, None) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Control and transfer operations of a SPI character device.
///
/// Setters and getters map one-to-one onto the device's control requests so
/// callers can verify each setting by reading it back.
pub trait SpiLink {
    type Error: std::error::Error + 'static;

    fn set_mode(&mut self, mode: Mode) -> Result<(), Self::Error>;
    fn mode(&mut self) -> Result<Mode, Self::Error>;
    fn set_bits_per_word(&mut self, bits: u8) -> Result<(), Self::Error>;
    fn bits_per_word(&mut self) -> Result<u8, Self::Error>;
    fn set_max_speed_hz(&mut self, speed_hz: u32) -> Result<(), Self::Error>;
    fn max_speed_hz(&mut self) -> Result<u32, Self::Error>;

    /// Issue one transfer and block until the hardware transaction completes.
    fn transfer(&mut self, transfer: &mut Transfer<'_>) -> Result<(), Self::Error>;
}

/// Convert an embedded-hal mode into spidev mode flags.
pub fn mode_flags(mode: Mode) -> SpiModeFlags {
    let mut flags = SpiModeFlags::empty();
    if mode.polarity == Polarity::IdleHigh {
        flags |= SpiModeFlags::SPI_CPOL;
    }
    if mode.phase == Phase::CaptureOnSecondTransition {
        flags |= SpiModeFlags::SPI_CPHA;
    }
    flags
}

/// Conventional SPI mode number (0..=3) of `mode`.
pub fn mode_number(mode: Mode) -> u8 {
    mode_flags(mode).bits() as u8
}

/// Decode the CPOL/CPHA bits of a raw mode byte. Other mode bits are ignored.
pub fn mode_from_bits(bits: u8) -> Mode {
    Mode {
        polarity: if bits & SPI_CPOL != 0 { Polarity::IdleHigh } else { Polarity::IdleLow },
        phase: if bits & SPI_CPHA != 0 {
            Phase::CaptureOnSecondTransition
        } else {
            Phase::CaptureOnFirstTransition
        },
    }
}

/// `SpiLink` over a Linux spidev node, e.g. `/dev/spidev2.0`.
pub struct SpidevLink {
    spi: Spidev,
}

impl SpidevLink {
    /// Open the device node for read/write. The descriptor stays open until
    /// the link is dropped.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let spi = Spidev::open(path)?;
        Ok(Self { spi })
    }
}

impl SpiLink for SpidevLink {
    type Error = io::Error;

    fn set_mode(&mut self, mode: Mode) -> io::Result<()> {
        spidevioctl::set_mode(self.spi.as_raw_fd(), mode_flags(mode))
    }

    fn mode(&mut self) -> io::Result<Mode> {
        spidevioctl::get_mode(self.spi.as_raw_fd()).map(mode_from_bits)
    }

    fn set_bits_per_word(&mut self, bits: u8) -> io::Result<()> {
        spidevioctl::set_bits_per_word(self.spi.as_raw_fd(), bits)
    }

    fn bits_per_word(&mut self) -> io::Result<u8> {
        spidevioctl::get_bits_per_word(self.spi.as_raw_fd())
    }

    fn set_max_speed_hz(&mut self, speed_hz: u32) -> io::Result<()> {
        spidevioctl::set_max_speed_hz(self.spi.as_raw_fd(), speed_hz)
    }

    fn max_speed_hz(&mut self) -> io::Result<u32> {
        spidevioctl::get_max_speed_hz(self.spi.as_raw_fd())
    }

    fn transfer(&mut self, transfer: &mut Transfer<'_>) -> io::Result<()> {
        let mut xfer = match (transfer.tx, transfer.rx.as_deref_mut()) {
            (Some(tx), Some(rx)) => SpidevTransfer::read_write(tx, rx),
            (Some(tx), None) => SpidevTransfer::write(tx),
            (None, Some(rx)) => SpidevTransfer::read(rx),
            (None, None) => return Ok(()),
        };
        xfer.cs_change = transfer.cs_change as u8;
        xfer.delay_usecs = transfer.delay_usecs;
        self.spi.transfer(&mut xfer)
    }
}
