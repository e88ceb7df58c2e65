//! Walk the network and print every renderer that announces itself.
//!
//! ```sh
//! cargo run --example discovery_walker
//! ```

use std::time::Duration;

use anyhow::Result;
use castcontrol::{ControlPoint, DeviceEvent};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "castcontrol=debug,castupnp=info".into()),
        )
        .init();

    let cp = ControlPoint::new();
    cp.init()?;

    let events = cp.subscribe_events()?;

    cp.search(Duration::from_secs(10), |devices| {
        for device in devices {
            println!(
                "  [search] {} ({}) tv={}",
                device.name, device.address, device.is_tv
            );
        }
    })?;

    println!("Listening for 30 s; unplug a device to see it leave...");
    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    while let Ok(event) = events.recv_timeout(deadline.saturating_duration_since(std::time::Instant::now()))
    {
        match event {
            DeviceEvent::Added(device) => {
                println!("+ {} [{}]", device.name, device.id);
            }
            DeviceEvent::Removed(id) => {
                println!("- gone [{}]", id);
            }
        }
    }

    let devices = cp.devices()?;
    println!("\n{} device(s) known at shutdown:", devices.len());
    for device in devices {
        println!("  {} @ {} (tv: {})", device.name, device.address, device.is_tv);
    }

    cp.release();
    Ok(())
}
