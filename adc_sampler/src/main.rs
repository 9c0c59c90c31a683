use std::env;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use adc_sampler::{sample_device, Config};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::{error, info, warn};

/// Set from the signal handler; polled by the sampling loop.
static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn request_stop(_: nix::libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

/// Route SIGINT and SIGTERM to `request_stop`. No SA_RESTART, so a blocked
/// transfer returns early and the loop sees the flag.
fn install_stop_handler() -> nix::Result<()> {
    let action = SigAction::new(SigHandler::Handler(request_stop), SaFlags::empty(), SigSet::empty());
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        unsafe { signal::sigaction(sig, &action)? };
    }
    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_args(env::args_os(), |key| env::var(key).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n {e}\n");
            return ExitCode::FAILURE;
        }
    };

    // Samples go to stdout, so diagnostics go to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder().with_writer(io::stderr).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set global tracing subscriber: {e}");
    }

    if let Err(e) = install_stop_handler() {
        warn!("Could not install signal handlers, stop with SIGKILL: {e}");
    }

    info!("Sampling {} ch{} in {:?} mode at {} Hz", config.device.display(), config.channel, config.mode, config.speed_hz);
    match sample_device(&config, &STOP) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            let _ = io::stdout().flush();
            ExitCode::FAILURE
        }
    }
}
