//! Cast a URL to the first renderer found and drive it a little.
//!
//! ```sh
//! cargo run --example cast_demo -- http://192.168.1.5:8000/movie.mp4
//! ```

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use castcontrol::{ControlAction, ControlPoint};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "castcontrol=info".into()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .context("usage: cast_demo <media-url> [title]")?;
    let title = std::env::args().nth(2).unwrap_or_else(|| "Demo".into());

    let cp = ControlPoint::new();
    cp.init()?;

    let (tx, rx) = mpsc::channel();
    cp.cast(&url, &title, move |result| {
        let _ = tx.send(result);
    })?;

    let device = rx
        .recv_timeout(Duration::from_secs(30))
        .context("cast timed out")?
        .context("cast failed")?;
    println!("▶ playing on {}", device.name);

    std::thread::sleep(Duration::from_secs(5));
    if let Ok((position, duration)) = cp.query_position() {
        println!("position: {position} ms / {duration} ms");
    }

    let (tx, rx) = mpsc::channel();
    cp.control(ControlAction::SetVolume(25), move |result| {
        let _ = tx.send(result);
    })?;
    rx.recv_timeout(Duration::from_secs(10))??;
    println!("volume set to 25");

    std::thread::sleep(Duration::from_secs(5));
    let (tx, rx) = mpsc::channel();
    cp.control(ControlAction::Pause, move |result| {
        let _ = tx.send(result);
    })?;
    rx.recv_timeout(Duration::from_secs(10))??;
    println!("paused; state: {:?}", cp.get_state().playback_state);

    cp.release();
    Ok(())
}
