use std::error::Error;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;

use linux_embedded_hal::Delay;
use spi_adc::{Channel, LinkConfig, SpiAdc, SpidevLink, DEFAULT_DEVICE};
use thiserror::Error;
use tracing::info;

use sampler::Sampler;

pub mod sampler;

/// Environment variable overriding the SPI device node.
pub const DEVICE_ENV: &str = "SPI_ADC_DEVICE";
/// Environment variable selecting `single` or `sequence` sampling.
pub const MODE_ENV: &str = "SPI_ADC_MODE";

/// Problems with the command line or environment. Always reported before the
/// device is opened.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Usage: {program} <ch> <speed-khz>")]
    Usage { program: String },
    #[error("invalid channel '{0}', expected 0..=3")]
    Channel(String),
    #[error("invalid speed '{0}', expected a positive number of kHz")]
    Speed(String),
    #[error("invalid SPI_ADC_MODE '{0}', expected 'single' or 'sequence'")]
    Mode(String),
}

/// How the sampler walks the channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Convert one channel repeatedly, rewriting a single output line.
    Single,
    /// Cycle through channels 0..=ch, one line per channel, once per second.
    #[default]
    Sequence,
}

impl FromStr for SamplingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(SamplingMode::Single),
            "sequence" => Ok(SamplingMode::Sequence),
            _ => Err(ConfigError::Mode(s.to_string())),
        }
    }
}

/// Process configuration, fixed before the device is touched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub device: PathBuf,
    pub channel: Channel,
    pub speed_hz: u32,
    pub mode: SamplingMode,
}

impl Config {
    /// Parse `<program> <ch> <speed-khz>`, with the device path and sampling
    /// mode taken from `env`.
    ///
    /// # Errors
    ///
    /// * `ConfigError::Usage` unless exactly two arguments follow the program name.
    /// * `ConfigError::Channel` / `ConfigError::Speed` / `ConfigError::Mode` for values that don't parse,
    ///   including arguments that are not valid UTF-8.
    pub fn from_args<I, F>(args: I, env: F) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = OsString>,
        F: Fn(&str) -> Option<String>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let [_, channel, speed] = args.as_slice() else {
            let program = args
                .first()
                .map(|program| program.to_string_lossy().into_owned())
                .unwrap_or_else(|| "adc_sampler".to_string());
            return Err(ConfigError::Usage { program });
        };

        let channel = match channel.to_str() {
            Some(channel) => parse_channel(channel)?,
            None => return Err(ConfigError::Channel(channel.to_string_lossy().into_owned())),
        };
        let speed_hz = match speed.to_str() {
            Some(speed) => parse_speed_khz(speed)?,
            None => return Err(ConfigError::Speed(speed.to_string_lossy().into_owned())),
        };
        let mode = match env(MODE_ENV) {
            Some(mode) => mode.parse()?,
            None => SamplingMode::default(),
        };

        Ok(Config { device: device_path(&env), channel, speed_hz, mode })
    }

    /// Link settings for this run.
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig::default().with_max_speed_hz(self.speed_hz)
    }
}

/// Device node from `SPI_ADC_DEVICE`, falling back to the default node.
pub fn device_path<F: Fn(&str) -> Option<String>>(env: F) -> PathBuf {
    env(DEVICE_ENV)
        .filter(|path| !path.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE))
}

pub fn parse_channel(arg: &str) -> Result<Channel, ConfigError> {
    arg.trim()
        .parse::<u8>()
        .ok()
        .and_then(|index| Channel::try_from(index).ok())
        .ok_or_else(|| ConfigError::Channel(arg.to_string()))
}

/// Parse a clock speed in kHz, returning Hz.
pub fn parse_speed_khz(arg: &str) -> Result<u32, ConfigError> {
    arg.trim()
        .parse::<u32>()
        .ok()
        .filter(|&khz| khz > 0)
        .and_then(|khz| khz.checked_mul(1000))
        .ok_or_else(|| ConfigError::Speed(arg.to_string()))
}

/// Open and configure the device, then sample until `stop` is set.
///
/// # Errors
///
/// Opening or configuring the device fails, or stdout can no longer be
/// written. Failed transfers while sampling are logged, not returned.
#[tracing::instrument(skip(stop))]
pub fn sample_device(config: &Config, stop: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let link = SpidevLink::open(&config.device)
        .map_err(|e| format!("can't open device {}: {}", config.device.display(), e))?;
    let adc = SpiAdc::open(link, &config.link_config())?;
    info!("Device {} configured: {:?}", config.device.display(), adc.config());

    let mut sampler = Sampler::new(adc, Delay, io::stdout(), config.channel);
    sampler.run(config.mode, stop)?;
    info!("Sampling stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::ffi::OsStringExt;
    use test_log::test;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    fn not_utf8() -> OsString {
        OsString::from_vec(vec![0xff])
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_channel_and_speed() {
        let config = Config::from_args(args(&["adc", "3", "500"]), no_env).expect("config");
        assert_eq!(
            config,
            Config {
                device: PathBuf::from("/dev/spidev2.0"),
                channel: Channel::Ch3,
                speed_hz: 500_000,
                mode: SamplingMode::Sequence,
            }
        );
        assert_eq!(config.link_config().max_speed_hz, 500_000);
        assert_eq!(config.link_config().bits_per_word, 16);
    }

    #[test]
    fn wrong_argument_count_is_usage_error() {
        for list in [args(&["adc"]), args(&["adc", "1"]), args(&["adc", "1", "2", "3"])] {
            assert_eq!(
                Config::from_args(list, no_env),
                Err(ConfigError::Usage { program: "adc".to_string() })
            );
        }
        assert_eq!(
            Config::from_args(Vec::new(), no_env),
            Err(ConfigError::Usage { program: "adc_sampler".to_string() })
        );
    }

    #[test]
    fn non_utf8_argument_with_wrong_count_is_usage_error() {
        assert_eq!(
            Config::from_args(vec![OsString::from("adc"), not_utf8()], no_env),
            Err(ConfigError::Usage { program: "adc".to_string() })
        );
        assert_eq!(
            Config::from_args(vec![not_utf8()], no_env),
            Err(ConfigError::Usage { program: "\u{FFFD}".to_string() })
        );
    }

    #[test]
    fn non_utf8_channel_or_speed_is_rejected() {
        assert_eq!(
            Config::from_args(vec![OsString::from("adc"), not_utf8(), OsString::from("1000")], no_env),
            Err(ConfigError::Channel("\u{FFFD}".to_string()))
        );
        assert_eq!(
            Config::from_args(vec![OsString::from("adc"), OsString::from("1"), not_utf8()], no_env),
            Err(ConfigError::Speed("\u{FFFD}".to_string()))
        );
    }

    #[test]
    fn usage_message_names_program() {
        let err = Config::from_args(args(&["./adc"]), no_env).unwrap_err();
        assert_eq!(err.to_string(), "Usage: ./adc <ch> <speed-khz>");
    }

    #[test]
    fn rejects_bad_channel() {
        assert_eq!(
            Config::from_args(args(&["adc", "4", "1000"]), no_env),
            Err(ConfigError::Channel("4".to_string()))
        );
        assert_eq!(
            Config::from_args(args(&["adc", "x", "1000"]), no_env),
            Err(ConfigError::Channel("x".to_string()))
        );
    }

    #[test]
    fn rejects_bad_speed() {
        for speed in ["0", "-5", "fast", "5000000"] {
            assert_eq!(
                Config::from_args(args(&["adc", "0", speed]), no_env),
                Err(ConfigError::Speed(speed.to_string()))
            );
        }
    }

    #[test]
    fn environment_overrides_device_and_mode() {
        let env = |key: &str| match key {
            DEVICE_ENV => Some("/dev/spidev0.1".to_string()),
            MODE_ENV => Some("Single".to_string()),
            _ => None,
        };
        let config = Config::from_args(args(&["adc", "0", "1000"]), env).expect("config");
        assert_eq!(config.device, PathBuf::from("/dev/spidev0.1"));
        assert_eq!(config.mode, SamplingMode::Single);
    }

    #[test]
    fn rejects_unknown_mode() {
        for mode in ["burst", "seq"] {
            let env = |key: &str| (key == MODE_ENV).then(|| mode.to_string());
            assert_eq!(
                Config::from_args(args(&["adc", "0", "1000"]), env),
                Err(ConfigError::Mode(mode.to_string()))
            );
        }
    }

    #[test]
    fn empty_device_falls_back_to_default() {
        let env = |key: &str| (key == DEVICE_ENV).then(String::new);
        assert_eq!(device_path(env), PathBuf::from(DEFAULT_DEVICE));
    }
}
