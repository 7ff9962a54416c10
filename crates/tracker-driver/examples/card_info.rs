//! Card info over the simulation
//!
//! Builds a device tree against a running firmware simulation, prints the
//! address map and version block, then lists every stream binding.

use tracker_driver::{DeviceTreeRoot, ModuleOptions, Result, RootConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("tracker_driver=info")
        .init();

    let config = RootConfig::simulated()
        .with_geometry(1, 4, 4)
        .with_options(ModuleOptions { poll_enabled: false, init_read: true });

    let root = DeviceTreeRoot::new(config)?;
    println!("Memory: {}\n", root.memory().binding());

    for claim in root.address_map() {
        println!("  {:<12} @ {:#010x} ({:#x} bytes)", claim.module, claim.base, claim.span);
    }

    if let Some(info) = root.pcie_core().last_read() {
        println!("\nFPGA version {:#010x}, scratch {:#010x}, up {} s", info.fpga_version, info.scratch_pad, info.up_time);
    }

    println!();
    for endpoint in root.grid().endpoints() {
        println!("  {} -> {}", endpoint.id(), endpoint.binding());
    }

    Ok(())
}
