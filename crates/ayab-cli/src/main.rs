//! `ayab` entrypoint: loads a job configuration, builds a demo pattern
//! (image loading is out of scope), and drives `KnitFsm` to completion
//! either against a real serial port or against the scripted
//! `"Simulation"` link.

use std::path::PathBuf;
use std::sync::Once;

use anyhow::{Context, Result};
use clap::Parser;
use rgb::RGB8;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use ayab_engine::{ChannelProgressSink, FsmOutcome, KnitFsm, MockSerialLink, SerialLink, SerialPortLink};
use ayab_image::{PatternBuffer, RgbaImage};
use ayab_machine::Config;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "ayab", version, about = "AYAB knitting engine")]
struct Args {
    /// Optional path to a job config file (overrides discovery of `ayab.toml`).
    #[arg(long = "config")]
    config: Option<PathBuf>,
    /// Override the configured port, e.g. to force "Simulation" for a dry run.
    #[arg(long = "port")]
    port: Option<String>,
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = std::path::Path::new(".");
        let log_path = log_dir.join("ayab.log");
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, "ayab.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .try_init()
        {
            Ok(_) => self.log_guard = Some(guard),
            Err(_err) => {
                // Global subscriber already installed (e.g. under a test harness).
            }
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

/// A small multi-color demo swatch, standing in for a quantised image file
/// since loading and editing real images is out of scope here.
fn demo_image(num_colors: u8) -> RgbaImage {
    let palette: Vec<RGB8> = (0..num_colors)
        .map(|c| {
            let v = 255 - (c as u16 * 255 / num_colors.max(1) as u16) as u8;
            RGB8::new(v, v / 2, 255 - v)
        })
        .collect();
    let width = 8u32;
    let height = 4u32;
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let index = ((x + y) % num_colors as u32) as usize;
            pixels.push(palette[index]);
        }
    }
    RgbaImage::new(width, height, pixels)
}

/// Total physical carriage passes a non-repeating job will request, found
/// by replaying the pure line planner rather than guessing a bound.
fn total_lines(config: &Config, pattern: &PatternBuffer) -> Result<u64> {
    for line in 0..1_000_000u64 {
        let plan = ayab_planner::plan(
            line,
            config.mode,
            config.num_colors,
            config.start_row,
            pattern.height,
            pattern.expanded_len(),
            false,
        );
        if plan.last {
            return Ok(line + 1);
        }
    }
    anyhow::bail!("line planner never reached its last line within the safety bound")
}

/// Build a `MockSerialLink` pre-loaded with the handshake and every
/// `reqLine` a non-repeating job of this shape will make.
fn scripted_simulation_link(config: &Config, pattern: &PatternBuffer) -> Result<MockSerialLink> {
    let mut link = MockSerialLink::new();
    link.push_inbound(vec![0xC3, 5, 1, 0]); // cnfInfo api=5
    link.push_inbound(vec![0x84, 1, 0, 0, 0, 0, 1, 0]); // indState ready=1
    link.push_inbound(vec![0xC1, 1]); // cnfStart ok=1

    let count = total_lines(config, pattern)?;
    for n in 0..count {
        link.push_inbound(vec![0x82, (n % 256) as u8]); // reqLine
    }
    Ok(link)
}

fn run() -> Result<()> {
    let args = Args::parse();
    let file = ayab_config::load_from(args.config.clone()).context("loading job configuration")?;
    let mut config = ayab_config::validate(file).context("validating job configuration")?;
    if let Some(port) = args.port {
        config = Config::validate(
            config.machine,
            config.num_colors,
            config.start_row,
            config.mode,
            config.inf_repeat,
            config.continuous_reporting,
            config.alignment,
            config.knit_start_needle,
            config.knit_stop_needle,
            port,
        )?;
    }

    let image = demo_image(config.num_colors);
    let pattern = PatternBuffer::build(&image, config.num_colors, config.machine)?;

    info!(
        target: "engine.cli",
        port = config.port.as_str(),
        mode = ?config.mode,
        num_colors = config.num_colors,
        pattern_height = pattern.height,
        "starting job"
    );

    let link: Box<dyn SerialLink> = if config.port == "Simulation" {
        Box::new(scripted_simulation_link(&config, &pattern)?)
    } else {
        Box::new(SerialPortLink::open(&config.port)?)
    };

    let (sink, events) = ChannelProgressSink::new(16);
    let mut fsm = KnitFsm::new(config, pattern, link, Box::new(sink));

    loop {
        match fsm.step()? {
            FsmOutcome::Running => {}
            FsmOutcome::Finished { ok } => {
                info!(target: "engine.cli", ok, "job finished");
                break;
            }
            FsmOutcome::Cancelled => {
                warn!(target: "engine.cli", "job cancelled");
                break;
            }
        }

        while let Ok(event) = events.progress.try_recv() {
            info!(target: "engine.cli.progress", ?event, "progress");
        }
        while let Ok(event) = events.side.try_recv() {
            info!(target: "engine.cli.notify", ?event, "side event");
        }
    }

    while let Ok(event) = events.progress.try_recv() {
        info!(target: "engine.cli.progress", ?event, "progress");
    }
    while let Ok(event) = events.side.try_recv() {
        info!(target: "engine.cli.notify", ?event, "side event");
    }

    Ok(())
}

fn main() -> Result<()> {
    let mut startup = AppStartup::new();
    startup.configure_logging()?;
    AppStartup::install_panic_hook();
    info!(target: "runtime", "startup");
    run()
}
