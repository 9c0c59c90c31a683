//! 4-channel SPI ADC driver for Linux using spidev and embedded-hal types.

use std::fmt;

use embedded_hal::spi::{Mode, MODE_2};
use thiserror::Error;
use tracing::{debug, warn};

pub mod link;
pub mod word;

pub use link::{SpiLink, SpidevLink, Transfer};
pub use word::{ControlWord, Sample};

/// Default device node.
pub const DEFAULT_DEVICE: &str = "/dev/spidev2.0";

/// Errors for the ADC driver.
#[derive(Error, Debug)]
pub enum Error<E: std::error::Error + 'static> {
    #[error("can't {step}: {source}")]
    Config {
        step: ConfigStep,
        #[source]
        source: E,
    },
    #[error("SPI transfer failed: {0}")]
    Transfer(#[source] E),
}

/// Channel index outside 0..=3.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("invalid channel {0}, expected 0..=3")]
pub struct InvalidChannel(pub u8);

/// One control request of the configuration sequence, in issue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigStep {
    SetMode,
    GetMode,
    SetBitsPerWord,
    GetBitsPerWord,
    SetMaxSpeed,
    GetMaxSpeed,
}

impl fmt::Display for ConfigStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigStep::SetMode => "set spi mode",
            ConfigStep::GetMode => "get spi mode",
            ConfigStep::SetBitsPerWord => "set bits per word",
            ConfigStep::GetBitsPerWord => "get bits per word",
            ConfigStep::SetMaxSpeed => "set max speed hz",
            ConfigStep::GetMaxSpeed => "get max speed hz",
        })
    }
}

/// Input channel selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Channel {
    Ch0 = 0,
    Ch1 = 1,
    Ch2 = 2,
    Ch3 = 3,
}

impl Channel {
    /// All channels in address order.
    pub const VALUES: [Channel; 4] = [Channel::Ch0, Channel::Ch1, Channel::Ch2, Channel::Ch3];

    /// Channels 0..=self, the order a sequence sweep visits them.
    pub fn sweep(self) -> impl Iterator<Item = Channel> {
        Self::VALUES.into_iter().take(self as usize + 1)
    }
}

impl TryFrom<u8> for Channel {
    type Error = InvalidChannel;

    fn try_from(index: u8) -> Result<Self, InvalidChannel> {
        Channel::VALUES.get(index as usize).copied().ok_or(InvalidChannel(index))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// Link settings applied once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    pub mode: Mode,
    pub bits_per_word: u8,
    pub max_speed_hz: u32,
    /// Delay after each transfer, in microseconds.
    pub delay_usecs: u16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig { mode: MODE_2, bits_per_word: 16, max_speed_hz: 1_000_000, delay_usecs: 10 }
    }
}

impl LinkConfig {
    pub fn with_max_speed_hz(mut self, max_speed_hz: u32) -> Self {
        self.max_speed_hz = max_speed_hz;
        self
    }
}

/// Apply `config` to the link: set then read back mode, bits per word and max
/// speed, in that order. Stops at the first failing request.
///
/// # Returns
///
/// The configuration as read back from the device. Read-back values that
/// differ from the requested ones are logged and kept.
#[tracing::instrument(skip(link))]
pub fn configure<L: SpiLink>(link: &mut L, config: &LinkConfig) -> Result<LinkConfig, Error<L::Error>> {
    link.set_mode(config.mode).map_err(failed(ConfigStep::SetMode))?;
    let mode = link.mode().map_err(failed(ConfigStep::GetMode))?;

    link.set_bits_per_word(config.bits_per_word).map_err(failed(ConfigStep::SetBitsPerWord))?;
    let bits_per_word = link.bits_per_word().map_err(failed(ConfigStep::GetBitsPerWord))?;

    link.set_max_speed_hz(config.max_speed_hz).map_err(failed(ConfigStep::SetMaxSpeed))?;
    let max_speed_hz = link.max_speed_hz().map_err(failed(ConfigStep::GetMaxSpeed))?;

    let effective = LinkConfig { mode, bits_per_word, max_speed_hz, delay_usecs: config.delay_usecs };
    if effective != *config {
        warn!("Device settings differ from requested: requested {:?}, read back {:?}", config, effective);
    }
    debug!("spi mode: {:?}", effective.mode);
    debug!("bits per word: {}", effective.bits_per_word);
    debug!("max speed: {} Hz ({} KHz)", effective.max_speed_hz, effective.max_speed_hz / 1000);
    Ok(effective)
}

fn failed<E: std::error::Error + 'static>(step: ConfigStep) -> impl FnOnce(E) -> Error<E> {
    move |source| Error::Config { step, source }
}

/// ADC on a configured SPI link.
pub struct SpiAdc<L> {
    link: L,
    config: LinkConfig,
}

impl<L: SpiLink> SpiAdc<L> {
    /// Wrap a link that has already been configured with `config`.
    pub fn new(link: L, config: LinkConfig) -> Self {
        SpiAdc { link, config }
    }

    /// Configure the link and wrap it, using the read-back settings.
    pub fn open(mut link: L, config: &LinkConfig) -> Result<Self, Error<L::Error>> {
        let effective = configure(&mut link, config)?;
        Ok(Self::new(link, effective))
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Give back the underlying link.
    pub fn release(self) -> L {
        self.link
    }

    /// Write a control word (outbound-only transfer).
    pub fn write_control(&mut self, command: ControlWord) -> Result<(), Error<L::Error>> {
        let tx = command.frame().to_ne_bytes();
        let mut transfer = Transfer::write(&tx)
            .with_cs_change(true)
            .with_delay_usecs(self.config.delay_usecs);
        self.link.transfer(&mut transfer).map_err(Error::Transfer)
    }

    /// Read one response frame (inbound-only transfer).
    pub fn read_word(&mut self) -> Result<u16, Error<L::Error>> {
        let mut rx = [0u8; 2];
        let mut transfer = Transfer::read(&mut rx)
            .with_cs_change(true)
            .with_delay_usecs(self.config.delay_usecs);
        self.link.transfer(&mut transfer).map_err(Error::Transfer)?;
        Ok(u16::from_ne_bytes(rx))
    }

    /// Read and decode one sample.
    pub fn read_sample(&mut self) -> Result<Sample, Error<L::Error>> {
        self.read_word().map(Sample::from_word)
    }

    /// Select `channel`, then read one sample from it.
    pub fn read_channel(&mut self, channel: Channel) -> Result<Sample, Error<L::Error>> {
        self.write_control(ControlWord::single(channel))?;
        self.read_sample()
    }
}
