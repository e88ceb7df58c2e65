//! Core data model: device identities, media state, discovery events.

use serde::{Deserialize, Serialize};
use url::Url;

use castupnp::description::{DeviceDescription, ServiceDescription, resolve_service_url};

/// Opaque device identity.
///
/// The description URL is the key: it is stable per announcement and
/// directly usable to refetch the description. Two ids may point at the
/// same physical device (e.g. after a reboot); they are treated as
/// independent devices.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What the facade exposes to applications.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    /// Host IP of the renderer.
    pub address: String,
    /// Heuristic: does this look like a TV?
    pub is_tv: bool,
}

/// Full device record owned by the discovery engine. Exposed read-only
/// as cloned snapshots; service URLs are already absolute.
#[derive(Clone, Debug)]
pub struct RemoteDevice {
    pub device: Device,
    pub manufacturer: String,
    pub model_name: String,
    pub device_type: String,
    pub services: Vec<ServiceDescription>,
    pub location: String,
    pub usn: String,
}

impl RemoteDevice {
    /// Build a device record from a parsed description.
    ///
    /// Relative service URLs are resolved against `location` here, once,
    /// so every consumer downstream sees absolute URLs.
    pub fn from_description(
        location: &str,
        usn: &str,
        fallback_address: &str,
        desc: &DeviceDescription,
    ) -> Self {
        let name = desc.display_name();
        let address = Url::parse(location)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| fallback_address.to_string());

        let services = desc
            .services
            .iter()
            .map(|s| ServiceDescription {
                service_type: s.service_type.clone(),
                service_id: s.service_id.clone(),
                control_url: resolve_url_if_set(location, &s.control_url),
                event_sub_url: resolve_url_if_set(location, &s.event_sub_url),
                scpd_url: resolve_url_if_set(location, &s.scpd_url),
            })
            .collect();

        let is_tv = is_tv_hint(&desc.manufacturer, &desc.model_name, &name);

        RemoteDevice {
            device: Device {
                id: DeviceId(location.to_string()),
                name,
                address,
                is_tv,
            },
            manufacturer: desc.manufacturer.clone(),
            model_name: desc.model_name.clone(),
            device_type: desc.device_type.clone(),
            services,
            location: location.to_string(),
            usn: usn.to_string(),
        }
    }

    /// Minimal record for devices whose description could not be
    /// retrieved for structural reasons: presence is recorded, casting
    /// is not possible.
    pub fn fallback(location: &str, usn: &str, fallback_address: &str) -> Self {
        let address = Url::parse(location)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_else(|| fallback_address.to_string());

        RemoteDevice {
            device: Device {
                id: DeviceId(location.to_string()),
                name: "DLNA Device".to_string(),
                address,
                is_tv: false,
            },
            manufacturer: "Unknown".to_string(),
            model_name: String::new(),
            device_type: String::new(),
            services: Vec::new(),
            location: location.to_string(),
            usn: usn.to_string(),
        }
    }

    pub fn avtransport_service(&self) -> Option<&ServiceDescription> {
        self.service_with_type("avtransport")
    }

    pub fn rendering_control_service(&self) -> Option<&ServiceDescription> {
        self.service_with_type("renderingcontrol")
    }

    pub fn is_castable(&self) -> bool {
        self.avtransport_service().is_some()
    }

    fn service_with_type(&self, needle: &str) -> Option<&ServiceDescription> {
        self.services
            .iter()
            .find(|s| s.type_contains(needle) && !s.control_url.trim().is_empty())
    }
}

fn resolve_url_if_set(location: &str, raw: &str) -> String {
    if raw.trim().is_empty() {
        String::new()
    } else {
        resolve_service_url(location, raw)
    }
}

/// TV heuristic over manufacturer/model/name strings.
pub fn is_tv_hint(manufacturer: &str, model_name: &str, name: &str) -> bool {
    const HINTS: [&str; 5] = ["tv", "samsung", "lg", "sony", "xiaomi"];

    let haystack = format!("{manufacturer} {model_name} {name}").to_ascii_lowercase();
    HINTS.iter().any(|hint| haystack.contains(hint))
}

/// Advisory playback state, refreshed on successful control actions and
/// explicit queries. The library does not subscribe to GENA eventing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Paused,
    Stopped,
    Buffering,
    Error,
}

impl PlaybackState {
    /// Map an AVTransport `CurrentTransportState` value.
    pub fn from_transport_state(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PLAYING" => PlaybackState::Playing,
            "PAUSED_PLAYBACK" | "PAUSED_RECORDING" => PlaybackState::Paused,
            "STOPPED" => PlaybackState::Stopped,
            "TRANSITIONING" => PlaybackState::Buffering,
            "NO_MEDIA_PRESENT" => PlaybackState::Idle,
            _ => PlaybackState::Error,
        }
    }
}

/// Cached media-state snapshot returned by `get_state()`.
#[derive(Clone, Debug, Default)]
pub struct MediaState {
    pub is_connected: bool,
    pub current_device: Option<Device>,
    pub playback_state: PlaybackState,
    pub volume: Option<u16>,
    pub is_muted: Option<bool>,
    pub position_ms: u64,
    pub duration_ms: u64,
}

impl MediaState {
    pub(crate) fn connect(&mut self, device: Device) {
        self.current_device = Some(device);
        self.is_connected = true;
    }

    pub(crate) fn disconnect(&mut self) {
        *self = MediaState::default();
    }
}

/// Discovery events delivered on the long-lived event channel.
#[derive(Clone, Debug)]
pub enum DeviceEvent {
    Added(Device),
    Removed(DeviceId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc_with_service(control_url: &str) -> DeviceDescription {
        DeviceDescription {
            friendly_name: "Living Room TV".into(),
            manufacturer: "Samsung".into(),
            model_name: "UE55".into(),
            device_type: "urn:schemas-upnp-org:device:MediaRenderer:1".into(),
            services: vec![ServiceDescription {
                service_type: "urn:schemas-upnp-org:service:AVTransport:1".into(),
                service_id: "urn:upnp-org:serviceId:AVTransport".into(),
                control_url: control_url.into(),
                event_sub_url: String::new(),
                scpd_url: String::new(),
            }],
        }
    }

    #[test]
    fn from_description_resolves_service_urls() {
        let remote = RemoteDevice::from_description(
            "http://192.168.1.20:49152/desc.xml",
            "uuid:abcd",
            "192.168.1.20",
            &desc_with_service("AVTransport/control"),
        );

        assert_eq!(remote.device.id.0, "http://192.168.1.20:49152/desc.xml");
        assert_eq!(remote.device.address, "192.168.1.20");
        assert!(remote.device.is_tv);
        assert_eq!(
            remote.avtransport_service().unwrap().control_url,
            "http://192.168.1.20:49152/AVTransport/control"
        );
        assert!(remote.is_castable());
    }

    #[test]
    fn fallback_device_records_presence_only() {
        let remote = RemoteDevice::fallback("http://192.168.1.9/d.xml", "uuid:x", "192.168.1.9");
        assert_eq!(remote.device.name, "DLNA Device");
        assert_eq!(remote.manufacturer, "Unknown");
        assert!(!remote.is_castable());
    }

    #[test]
    fn tv_hint_matches_known_brands_and_tv_substring() {
        assert!(is_tv_hint("Samsung", "", ""));
        assert!(is_tv_hint("", "Bravia TV", ""));
        assert!(is_tv_hint("", "", "Xiaomi Box"));
        assert!(!is_tv_hint("Acme", "Speaker One", "Kitchen"));
    }

    #[test]
    fn transport_state_mapping() {
        assert_eq!(
            PlaybackState::from_transport_state("PLAYING"),
            PlaybackState::Playing
        );
        assert_eq!(
            PlaybackState::from_transport_state("paused_playback"),
            PlaybackState::Paused
        );
        assert_eq!(
            PlaybackState::from_transport_state("NO_MEDIA_PRESENT"),
            PlaybackState::Idle
        );
        assert_eq!(
            PlaybackState::from_transport_state("SOMETHING_ELSE"),
            PlaybackState::Error
        );
    }

    #[test]
    fn media_state_connection_invariant() {
        let mut state = MediaState::default();
        assert_eq!(state.is_connected, state.current_device.is_some());

        state.connect(Device {
            id: DeviceId("http://h/d.xml".into()),
            name: "TV".into(),
            address: "h".into(),
            is_tv: true,
        });
        assert_eq!(state.is_connected, state.current_device.is_some());

        state.disconnect();
        assert_eq!(state.is_connected, state.current_device.is_some());
    }
}
