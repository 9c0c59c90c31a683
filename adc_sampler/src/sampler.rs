//! Sampling loops. The converter is put into single-channel or sequence mode
//! once, then read continuously until the stop flag is raised.
//!
//! Transfer failures are logged and never end a loop. Only an output error
//! (stdout closed) does.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use spi_adc::{Channel, ControlWord, Sample, SpiAdc, SpiLink};
use tracing::{error, warn};

use crate::SamplingMode;

/// Pause between sequence sweeps.
pub const SWEEP_PAUSE_MS: u32 = 1000;

/// Drives an ADC and prints what it reads to `out`.
pub struct Sampler<L, D, W> {
    adc: SpiAdc<L>,
    /// Used for the pause between sweeps.
    delay: D,
    out: W,
    /// Channel to convert in single mode; last channel of the sweep in sequence mode.
    channel: Channel,
    /// Most recent word read in single mode. Reprinted when a read fails.
    last_word: u16,
}

impl<L, D, W> Sampler<L, D, W>
where
    L: SpiLink,
    D: DelayNs,
    W: Write,
{
    pub fn new(adc: SpiAdc<L>, delay: D, out: W, channel: Channel) -> Self {
        Self { adc, delay, out, channel, last_word: 0 }
    }

    /// Hand back the ADC and the output sink.
    pub fn into_parts(self) -> (SpiAdc<L>, W) {
        (self.adc, self.out)
    }

    /// Run the loop for `mode` until `stop` is set.
    pub fn run(&mut self, mode: SamplingMode, stop: &AtomicBool) -> io::Result<()> {
        match mode {
            SamplingMode::Single => self.run_single(stop),
            SamplingMode::Sequence => self.run_sequence(stop),
        }
    }

    /// Select the channel once, then poll it, rewriting one line per read.
    pub fn run_single(&mut self, stop: &AtomicBool) -> io::Result<()> {
        self.select(ControlWord::single(self.channel));
        while !stop.load(Ordering::Relaxed) {
            self.poll()?;
        }
        Ok(())
    }

    /// Start the converter's sequencer over channels 0..=ch, then print one
    /// sweep per second followed by a blank line.
    pub fn run_sequence(&mut self, stop: &AtomicBool) -> io::Result<()> {
        self.select(ControlWord::sequence(self.channel));
        while !stop.load(Ordering::Relaxed) {
            self.sweep()?;
            self.delay.delay_ms(SWEEP_PAUSE_MS);
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(())
    }

    /// Write a control word. Failure is logged; reads go ahead regardless.
    fn select(&mut self, command: ControlWord) {
        if let Err(e) = self.adc.write_control(command) {
            error!("Failed to write control word {:#06x}: {}", command.frame(), e);
        }
    }

    /// One single-mode read: `ch<n>: <volts>v(0x<RAW>)` followed by a
    /// carriage return.
    pub fn poll(&mut self) -> io::Result<Sample> {
        match self.adc.read_word() {
            Ok(word) => {
                self.last_word = word;
                check_channel(self.channel, Sample::from_word(word));
            }
            Err(e) => error!("Failed to read ch{}: {}", self.channel, e),
        }
        let sample = Sample::from_word(self.last_word);
        write!(self.out, "ch{}: {:6.1}v(0x{:02X})\r", sample.channel, sample.voltage(), sample.raw)?;
        self.out.flush()?;
        Ok(sample)
    }

    /// One sequence sweep: a line per channel 0..=ch. A failed read prints as
    /// a zero sample.
    pub fn sweep(&mut self) -> io::Result<Vec<Sample>> {
        let mut samples = Vec::with_capacity(self.channel as usize + 1);
        for expected in self.channel.sweep() {
            let sample = match self.adc.read_sample() {
                Ok(sample) => {
                    check_channel(expected, sample);
                    sample
                }
                Err(e) => {
                    error!("Failed to read ch{}: {}", expected, e);
                    Sample::default()
                }
            };
            writeln!(self.out, "{}", format_sample(&sample))?;
            self.out.flush()?;
            samples.push(sample);
        }
        Ok(samples)
    }
}

/// Sequence-mode line, e.g. `ch1:    2.5v (0x80)`.
///
/// The raw value uses Rust's alternate hex form, so zero prints as `0x0`
/// rather than the bare `0` of C's `%#x`.
pub fn format_sample(sample: &Sample) -> String {
    format!("ch{}: {:6.1}v ({:#x})", sample.channel, sample.voltage(), sample.raw)
}

/// The converter tags each result with its channel. A mismatch means the
/// sequencer and the sampler disagree; the sample is still printed.
fn check_channel(expected: Channel, sample: Sample) {
    if sample.channel != expected as u8 {
        warn!("Expected a sample from ch{}, converter reported ch{}", expected, sample.channel);
    }
}
