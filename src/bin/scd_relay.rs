//! scd relay - stream a newly created file through an scd channel
//!
//! Watches a directory, waits for one file to appear, writes it into the
//! channel and prints what comes out the other end on stdout.
//!
//! Usage:
//!   cargo run --release --bin scd_relay -- [OPTIONS]

use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use scd::{AccessMode, Device, DeviceConfig, OpenFlags, ScdError, Session, DEFAULT_CAPACITY};

/// Relay configuration
struct RelayConfig {
    watch_dir: PathBuf,
    device_path: String,
    capacity: usize,
    timeout_ms: Option<u64>,
    verbose: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("."),
            device_path: "/dev/scd".to_string(),
            capacity: DEFAULT_CAPACITY,
            timeout_ms: None,
            verbose: false,
        }
    }
}

/// Copy channel output to stdout until the session is interrupted
fn drain_to_stdout(session: &Session) -> io::Result<u64> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut buf = vec![0u8; 4096];
    let mut total = 0u64;

    loop {
        match session.read(&mut buf) {
            Ok(n) => {
                out.write_all(&buf[..n])?;
                total += n as u64;
            }
            Err(ScdError::Interrupted) => break,
            Err(e) => return Err(e.into()),
        }
    }

    out.flush()?;
    Ok(total)
}

#[cfg(target_os = "linux")]
fn run_relay(config: RelayConfig) -> scd::Result<()> {
    use scd::relay::{copy_file_to_channel, DirectoryWatcher};

    let device = Device::new(DeviceConfig {
        default_capacity: config.capacity,
        ..DeviceConfig::default()
    })?;

    // Reader first: opening rewinds the channel.
    let reader = device.open_path(&config.device_path, AccessMode::ReadOnly, OpenFlags::empty())?;
    let writer = device.open_path(&config.device_path, AccessMode::WriteOnly, OpenFlags::empty())?;

    let mut watcher = DirectoryWatcher::new(&config.watch_dir)
        .map_err(|e| ScdError::from_io(e, "starting directory watch"))?;
    info!("watching {}", watcher.dir().display());

    thread::scope(|s| {
        let stop = reader.interrupter();
        let consumer = s.spawn(|| drain_to_stdout(&reader));

        let timeout = config.timeout_ms.map(Duration::from_millis);
        match watcher.wait_for_created(timeout) {
            // Copy just one file and exit.
            Ok(Some(path)) => match copy_file_to_channel(&path, &writer) {
                Ok(n) => info!("copied {} bytes from {}", n, path.display()),
                Err(e) => warn!("error copying {}: {}", path.display(), e),
            },
            Ok(None) => info!("no file created before timeout"),
            Err(e) => error!("error reading inotify: {}", e),
        }

        // Let the reader catch up before stopping it.
        while reader.readiness().contains(scd::Interest::READABLE) && !consumer.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        stop.interrupt();

        match consumer.join() {
            Ok(Ok(n)) => {
                if config.verbose {
                    info!("relayed {} bytes", n);
                }
            }
            Ok(Err(e)) => warn!("stdout error: {}", e),
            Err(_) => error!("reader thread panicked"),
        }
    });

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn run_relay(_config: RelayConfig) -> scd::Result<()> {
    Err(ScdError::invalid_argument(
        "directory watching requires Linux inotify",
    ))
}

fn parse_args() -> RelayConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = RelayConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" | "-d" => {
                if i + 1 < args.len() {
                    config.watch_dir = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--device" => {
                if i + 1 < args.len() {
                    config.device_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--capacity" | "-c" => {
                if i + 1 < args.len() {
                    config.capacity = args[i + 1].parse().unwrap_or(DEFAULT_CAPACITY);
                    i += 1;
                }
            }
            "--timeout-ms" | "-t" => {
                if i + 1 < args.len() {
                    config.timeout_ms = args[i + 1].parse().ok();
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--help" | "-h" => {
                println!("scd relay - stream one new file through an scd channel\n");
                println!("Usage: scd_relay [OPTIONS]\n");
                println!("Options:");
                println!("  -d, --dir <PATH>        Directory to watch (default: .)");
                println!("      --device <NODE>     Channel node (default: /dev/scd)");
                println!("  -c, --capacity <BYTES>  Channel capacity (default: 32768)");
                println!("  -t, --timeout-ms <MS>   Give up after MS milliseconds (default: wait forever)");
                println!("  -v, --verbose           Verbose output");
                println!("  -h, --help              Show this help");
                std::process::exit(0);
            }
            other => {
                eprintln!("ignoring unknown argument {}", other);
            }
        }
        i += 1;
    }

    config
}

fn main() {
    env_logger::init();
    let config = parse_args();

    if let Err(e) = run_relay(config) {
        eprintln!("scd relay error: {}", e);
        std::process::exit(1);
    }
}
