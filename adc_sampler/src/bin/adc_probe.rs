use std::env;
use std::error::Error;

use adc_sampler::{device_path, parse_speed_khz};
use spi_adc::link::mode_number;
use spi_adc::{configure, LinkConfig, SpidevLink};

/// Configure the device and print what it reports back.
fn main() -> Result<(), Box<dyn Error>> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_writer(std::io::stderr).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = LinkConfig::default();
    if let Some(arg) = env::args().nth(1) {
        config.max_speed_hz = parse_speed_khz(&arg)?;
    }

    let device = device_path(|key| env::var(key).ok());
    let mut link = SpidevLink::open(&device).map_err(|e| format!("can't open device {}: {}", device.display(), e))?;
    let effective = configure(&mut link, &config)?;

    println!("device: {}", device.display());
    println!("spi mode: {}", mode_number(effective.mode));
    println!("bits per word: {}", effective.bits_per_word);
    println!("max speed: {} Hz ({} KHz)", effective.max_speed_hz, effective.max_speed_hz / 1000);
    Ok(())
}
