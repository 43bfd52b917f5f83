#[cfg_attr(not(feature = "bladerf"), allow(dead_code))]
mod commands;
mod config;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use brf_sdr::error::SdrResult;
use brf_sdr::stream::{FailureBudget, RxOptions, StreamConfig, TxOptions};
use brf_sdr::{Channel, Format, SyncDevice};

use config::Profile;

#[derive(Parser, Debug)]
#[command(name = "brf")]
#[command(about = "bladeRF synchronous RX/TX streaming and frequency scanning")]
struct Cli {
    /// Serial number of the device to open (falls back to the first device)
    #[arg(short = 's', long, global = true)]
    serial: Option<String>,

    /// JSON profile with rx, tx, stream and scan settings
    #[arg(short = 'p', long, global = true)]
    profile: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the synchronous interface buffering
#[derive(Args, Debug, Clone, Default)]
struct StreamArgs {
    /// Number of internal buffers
    #[arg(long)]
    num_buffers: Option<u32>,

    /// Internal buffer size in samples (multiple of 1024)
    #[arg(long)]
    buffer_size: Option<u32>,

    /// Number of USB transfers in flight
    #[arg(long)]
    num_transfers: Option<u32>,

    /// Stream timeout in milliseconds
    #[arg(long)]
    stream_timeout: Option<u32>,

    /// Use the timestamped (metadata) sample format
    #[arg(long)]
    metadata: bool,
}

impl StreamArgs {
    fn apply(&self, base: &StreamConfig) -> StreamConfig {
        let mut s = *base;
        if let Some(v) = self.num_buffers {
            s.num_buffers = v;
        }
        if let Some(v) = self.buffer_size {
            s.buffer_size = v;
        }
        if let Some(v) = self.num_transfers {
            s.num_transfers = v;
        }
        if let Some(v) = self.stream_timeout {
            s.timeout_ms = v;
        }
        if self.metadata {
            s.format = Format::Sc16Q11Meta;
        }
        s
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure the RX channel and receive samples
    Rx {
        #[command(flatten)]
        stream: StreamArgs,

        /// Center frequency in Hz
        #[arg(short = 'f', long)]
        frequency: Option<u64>,

        /// Gain in dB
        #[arg(short = 'g', long, allow_hyphen_values = true)]
        gain: Option<i32>,

        /// Samples per pull
        #[arg(short = 'n', long, default_value = "10000")]
        samples: usize,

        /// Stop after this many buffers (default: run until failure)
        #[arg(short = 'b', long)]
        buffers: Option<u64>,

        /// Timeout for each pull in milliseconds
        #[arg(long, default_value = "5000")]
        timeout: u32,

        /// Consecutive failed pulls before giving up
        #[arg(long, default_value = "3")]
        max_failures: u32,
    },

    /// Configure the TX channel and transmit blocks of samples
    Tx {
        #[command(flatten)]
        stream: StreamArgs,

        /// Center frequency in Hz
        #[arg(short = 'f', long)]
        frequency: Option<u64>,

        /// Gain in dB
        #[arg(short = 'g', long, allow_hyphen_values = true)]
        gain: Option<i32>,

        /// Samples per push
        #[arg(short = 'n', long, default_value = "10000")]
        samples: usize,

        /// Number of blocks to transmit
        #[arg(short = 'b', long, default_value = "1")]
        blocks: u64,

        /// Timeout for each push in milliseconds
        #[arg(long, default_value = "5000")]
        timeout: u32,

        /// Consecutive failed pushes before giving up
        #[arg(long, default_value = "3")]
        max_failures: u32,

        /// Schedule bursts by timestamp (implies --metadata)
        #[arg(long)]
        schedule: bool,

        /// Time to let the last samples reach the front end, in milliseconds
        #[arg(long, default_value = "2000")]
        grace: u64,
    },

    /// Sweep a band, reading back the tuned frequency at each step
    Scan {
        /// Start of the sweep in MHz
        #[arg(long)]
        min: Option<f64>,

        /// End of the sweep in MHz (inclusive)
        #[arg(long)]
        max: Option<f64>,

        /// Step in MHz
        #[arg(long)]
        step: Option<f64>,

        /// Sweep the TX channel instead of RX
        #[arg(long)]
        tx: bool,
    },

    /// List attached devices
    List,
}

#[cfg_attr(not(feature = "bladerf"), allow(dead_code))]
fn run_command<D: SyncDevice + ?Sized>(
    dev: &mut D,
    cmd: &Command,
    profile: &Profile,
    running: &Arc<AtomicBool>,
) -> SdrResult<()> {
    match cmd {
        Command::Rx {
            stream,
            frequency,
            gain,
            samples,
            buffers,
            timeout,
            max_failures,
        } => {
            let mut rx = profile.rx;
            rx.frequency = frequency.unwrap_or(rx.frequency);
            rx.gain = gain.unwrap_or(rx.gain);
            let opts = RxOptions {
                channel_index: rx.channel.index,
                samples_len: *samples,
                timeout_ms: *timeout,
                max_buffers: *buffers,
                budget: FailureBudget::new(*max_failures),
                running: Some(running.clone()),
            };
            commands::run_rx(dev, &rx, &stream.apply(&profile.stream), &opts)?;
        }
        Command::Tx {
            stream,
            frequency,
            gain,
            samples,
            blocks,
            timeout,
            max_failures,
            schedule,
            grace,
        } => {
            let mut tx = profile.tx;
            tx.frequency = frequency.unwrap_or(tx.frequency);
            tx.gain = gain.unwrap_or(tx.gain);
            let mut s = stream.apply(&profile.stream);
            if *schedule {
                s.schedule = true;
                s.format = Format::Sc16Q11Meta;
            }
            let opts = TxOptions {
                channel_index: tx.channel.index,
                samples_len: *samples,
                timeout_ms: *timeout,
                grace: commands::grace(*grace),
                budget: FailureBudget::new(*max_failures),
                running: Some(running.clone()),
                ..TxOptions::default()
            };
            commands::run_tx(dev, &tx, &s, &opts, *blocks)?;
        }
        Command::Scan { min, max, step, tx } => {
            let ch = if *tx { Channel::tx(0) } else { Channel::rx(0) };
            let mut scan = profile.scan;
            scan.range = commands::scan_range(scan.range, *min, *max, *step);
            commands::run_scan(dev, ch, &scan, commands::print_point)?;
        }
        Command::List => {}
    }
    Ok(())
}

#[cfg(feature = "bladerf")]
fn run(cli: &Cli, profile: &Profile) -> SdrResult<()> {
    use brf_sdr::bladerf::{list_devices, BladerfDevice};

    if let Command::List = cli.command {
        let devices = list_devices().map_err(|status| brf_sdr::SdrError::Open { status })?;
        if devices.is_empty() {
            println!("no bladeRF devices found");
        }
        for d in devices {
            println!(
                "instance {}: serial {} (bus {}, addr {})",
                d.instance, d.serial, d.usb_bus, d.usb_addr
            );
        }
        return Ok(());
    }

    // Ctrl-C ends the stream loops so the channel is disabled and the
    // device closed before exit
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, std::sync::atomic::Ordering::SeqCst);
    }) {
        log::warn!("failed to set Ctrl+C handler: {}", e);
    }

    // Closed when it goes out of scope, before the process exits
    let mut dev = BladerfDevice::open_with_serial(cli.serial.as_deref())?;
    run_command(&mut dev, &cli.command, profile, &running)
}

#[cfg(not(feature = "bladerf"))]
fn run(_cli: &Cli, _profile: &Profile) -> SdrResult<()> {
    eprintln!("brf was built without hardware support; rebuild with --features bladerf");
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    let profile = match &cli.profile {
        Some(path) => match config::load(path) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        },
        None => Profile::default(),
    };

    if let Err(e) = run(&cli, &profile) {
        eprintln!("error: {}", e);
        std::process::exit(e.status().code());
    }
}
