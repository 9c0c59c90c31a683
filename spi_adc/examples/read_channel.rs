use spi_adc::{Channel, LinkConfig, SpiAdc, SpidevLink, DEFAULT_DEVICE};
use tracing::Level;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let link = SpidevLink::open(DEFAULT_DEVICE)?;
    let mut adc = SpiAdc::open(link, &LinkConfig::default())?;
    let sample = adc.read_channel(Channel::Ch0)?;
    println!("ch{}: {:.3} V ({:#04x})", sample.channel, sample.voltage(), sample.raw);
    Ok(())
}
