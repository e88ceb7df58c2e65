//! # castcontrol - DLNA/UPnP AV control point
//!
//! Discover media renderers on the local network, push a media URL to
//! one of them and drive its playback (transport, volume, mute,
//! position).
//!
//! ## Architecture
//!
//! - [`ControlPoint`] : the facade applications own
//! - [`DiscoveryEngine`] : SSDP listener, description fetches, liveness
//! - [`MediaController`] : per-device AVTransport / RenderingControl SOAP
//! - [`HttpClient`] : short-lived HTTP with a description cache
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use castcontrol::{ControlAction, ControlPoint};
//!
//! let cp = ControlPoint::new();
//! cp.init()?;
//!
//! cp.search(Duration::from_secs(5), |devices| {
//!     for device in devices {
//!         println!("found {} at {}", device.name, device.address);
//!     }
//! })?;
//!
//! cp.cast("http://192.168.1.5:8000/movie.mp4", "Movie night", |result| {
//!     match result {
//!         Ok(device) => println!("playing on {}", device.name),
//!         Err(e) => eprintln!("cast failed: {e}"),
//!     }
//! })?;
//!
//! cp.control(ControlAction::SetVolume(30), |_| {})?;
//! cp.release();
//! # Ok::<(), castcontrol::CastError>(())
//! ```

pub mod config;
pub mod control_point;
pub mod discovery;
pub mod errors;
mod events;
pub mod http_client;
mod lru;
pub mod media_controller;
pub mod model;
pub mod soap_client;

pub use config::{CastConfig, USER_AGENT};
pub use control_point::{ControlAction, ControlPoint};
pub use discovery::{DiscoveryEngine, EngineState};
pub use errors::CastError;
pub use http_client::{HttpClient, HttpResponse};
pub use media_controller::MediaController;
pub use model::{
    Device, DeviceEvent, DeviceId, MediaState, PlaybackState, RemoteDevice, is_tv_hint,
};
pub use soap_client::{SoapCallResult, SoapHttpReply, SoapTransport, invoke_upnp_action};
