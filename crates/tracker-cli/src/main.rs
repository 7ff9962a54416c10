//! `tracker`: bring-up CLI for the tracker PCIe PGP/FC card.
//!
//! ```text
//! USAGE:
//!   tracker [--sim] [--dev PATH] [-l LANES] [--num-links N] [--num-vc N] <command>
//!
//!   tracker topology                 Build the tree and print its bindings
//!   tracker read <addr>              Read a 32-bit register
//!   tracker write <addr> <value>     Write a 32-bit register
//!   tracker prbs [--frames N]        Run software PRBS on every stream cell
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracker_driver::chip::sim;
use tracker_driver::{
    DeviceTreeRoot, Direction, ModuleOptions, RootConfig, SimEndpoint, Termination, TransportMode,
};

#[derive(Parser)]
#[command(name = "tracker", about = "Tracker PCIe PGP/FC card bring-up", version)]
struct Cli {
    #[command(flatten)]
    tree: TreeArgs,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Args)]
struct TreeArgs {
    /// Path to the device driver node.
    #[arg(long, env = "TRACKER_DEV", default_value = tracker_driver::chip::DEFAULT_DEVICE)]
    dev: String,

    /// Talk to the firmware simulation instead of hardware.
    #[arg(long)]
    sim: bool,

    /// Number of DMA lanes (same as transceiver quads).
    #[arg(long = "num-lanes", short = 'l', default_value_t = 1)]
    num_lanes: usize,

    /// Number of physical links per quad.
    #[arg(long = "num-links", default_value_t = 4)]
    num_links: usize,

    /// Number of virtual channels per quad and per link.
    #[arg(long = "num-vc", default_value_t = 4)]
    num_vc: usize,

    /// Enable auto-polling in the register-map modules.
    #[arg(long = "poll-en")]
    poll_en: bool,

    /// Connect software PRBS to every DMA lane.
    #[arg(long = "prbs-en")]
    prbs_en: bool,

    /// Read all registers once at start.
    #[arg(long = "init-read")]
    init_read: bool,

    /// Simulation host.
    #[arg(long = "sim-host", default_value = sim::DEFAULT_HOST)]
    sim_host: String,

    /// Simulation memory server port.
    #[arg(long = "sim-mem-port", default_value_t = sim::MEMORY_PORT)]
    sim_mem_port: u16,

    /// Simulation port of stream lane 0 / VC 0.
    #[arg(long = "sim-stream-port", default_value_t = sim::STREAM_BASE_PORT)]
    sim_stream_port: u16,
}

impl TreeArgs {
    fn config(&self) -> RootConfig {
        RootConfig {
            mode: if self.sim {
                TransportMode::Simulated
            } else {
                TransportMode::Hardware
            },
            device: self.dev.clone(),
            ..RootConfig::default()
        }
        .with_geometry(self.num_lanes, self.num_links, self.num_vc)
        .with_self_test(self.prbs_en)
        .with_options(ModuleOptions {
            poll_enabled: self.poll_en,
            init_read: self.init_read,
        })
        .with_sim(SimEndpoint {
            host: self.sim_host.clone(),
            memory_port: self.sim_mem_port,
            stream_base_port: self.sim_stream_port,
        })
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Build the tree and print memory, module and stream bindings.
    Topology,
    /// Read a 32-bit register (absolute address, hex or decimal).
    Read {
        /// Register address.
        #[arg(value_parser = parse_u64)]
        addr: u64,
    },
    /// Write a 32-bit register (absolute address, hex or decimal).
    Write {
        /// Register address.
        #[arg(value_parser = parse_u64)]
        addr: u64,
        /// Value to write.
        #[arg(value_parser = parse_u32)]
        value: u32,
    },
    /// Send PRBS frames on every cell and check what comes back.
    Prbs {
        /// Frames per cell.
        #[arg(long, default_value_t = 16)]
        frames: usize,
        /// Payload words per frame.
        #[arg(long, default_value_t = 256)]
        words: usize,
        /// Milliseconds to wait for frames to return.
        #[arg(long, default_value_t = 1000)]
        wait_ms: u64,
    },
}

fn parse_u64(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn parse_u32(s: &str) -> Result<u32, String> {
    let v = parse_u64(s)?;
    u32::try_from(v).map_err(|_| format!("{s} does not fit in 32 bits"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = cli.tree.config();

    match cli.command {
        Cmd::Topology => cmd_topology(cfg)?,
        Cmd::Read { addr } => cmd_read(cfg, addr)?,
        Cmd::Write { addr, value } => cmd_write(cfg, addr, value)?,
        Cmd::Prbs { frames, words, wait_ms } => {
            cfg.self_test = true;
            cmd_prbs(cfg, frames, words, wait_ms)?;
        }
    }

    Ok(())
}

fn build(cfg: RootConfig) -> Result<DeviceTreeRoot> {
    let mode = cfg.mode;
    info!(
        "Building {mode} tree: {} lanes x {} VCs",
        cfg.geometry.lanes, cfg.geometry.vcs
    );
    DeviceTreeRoot::new(cfg).with_context(|| format!("building {mode} device tree"))
}

fn cmd_topology(cfg: RootConfig) -> Result<()> {
    let root = build(cfg)?;
    let c = root.config();

    println!("Transport    : {}", c.mode);
    println!("Memory       : {}", root.memory().binding());
    println!(
        "Geometry     : {} lanes x {} links x {} VCs",
        c.geometry.lanes, c.geometry.links, c.geometry.vcs
    );
    println!("Self-test    : {}", if c.self_test { "software PRBS" } else { "pass-through" });
    println!();

    for claim in root.address_map() {
        println!(
            "  {:<12} {:#010x} .. {:#010x}",
            claim.module,
            claim.base,
            claim.base + claim.span
        );
    }
    if let Some(info) = root.pcie_core().last_read() {
        println!("  FPGA version {:#010x}  up {} s", info.fpga_version, info.up_time);
    }
    println!();

    for cell in root.grid().cells() {
        let owner = match cell.termination() {
            Termination::SelfTest(tap) => {
                format!("{} / {}", tap.generator().name(), tap.checker().name())
            }
            Termination::PassThrough { .. } => "external".to_string(),
        };
        for direction in Direction::ALL {
            println!(
                "  [{}][{}] {direction} {:<32} {owner}",
                cell.lane(),
                cell.vc(),
                cell.endpoint(direction).binding().to_string()
            );
        }
    }

    Ok(())
}

fn cmd_read(cfg: RootConfig, addr: u64) -> Result<()> {
    let root = build(cfg)?;
    let value = root
        .memory()
        .read32(addr)
        .with_context(|| format!("reading {addr:#010x}"))?;
    println!("{addr:#010x} = {value:#010x}");
    Ok(())
}

fn cmd_write(cfg: RootConfig, addr: u64, value: u32) -> Result<()> {
    let root = build(cfg)?;
    root.memory()
        .write32(addr, value)
        .with_context(|| format!("writing {addr:#010x}"))?;
    info!("Wrote {value:#010x} to {addr:#010x}");
    println!("{addr:#010x} <- {value:#010x}");
    Ok(())
}

fn cmd_prbs(cfg: RootConfig, frames: usize, words: usize, wait_ms: u64) -> Result<()> {
    let mut root = build(cfg)?;
    let expected = frames as u64;

    for tap in root.grid_mut().taps_mut() {
        for _ in 0..frames {
            tap.send_frame(words)?;
        }
    }

    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(wait_ms);
    loop {
        let mut pending = false;
        for tap in root.grid_mut().taps_mut() {
            tap.poll()?;
            pending |= tap.checker().stats().frames < expected;
        }
        if !pending || std::time::Instant::now() >= deadline {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    let mut failed = false;
    for tap in root.grid_mut().taps_mut() {
        let tx = tap.generator().stats();
        let rx = tap.checker().stats();
        let ok = rx.errors == 0 && rx.frames == tx.frames;
        if !ok {
            warn!(
                "{}: {} of {} frames back, {} errors",
                tap.checker().name(),
                rx.frames,
                tx.frames,
                rx.errors
            );
        }
        failed |= !ok;
        println!(
            "  [{}][{}] tx {:>6} frames  rx {:>6} frames  {:>3} errors  {}",
            tap.lane(),
            tap.vc(),
            tx.frames,
            rx.frames,
            rx.errors,
            if ok { "ok" } else { "FAIL" }
        );
    }

    if failed {
        bail!("PRBS check failed");
    }
    Ok(())
}
