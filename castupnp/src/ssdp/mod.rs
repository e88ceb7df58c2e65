//! # Module SSDP - Simple Service Discovery Protocol
//!
//! HTTPU message parsing and the multicast socket used by the discovery
//! engine. This side of the protocol is the *control point* side: we send
//! M-SEARCH requests and listen for NOTIFY announcements and unicast
//! search responses.
//!
//! ## Constants SSDP
//!
//! - **Multicast Address**: 239.255.255.250:1900
//! - **Max-Age fallback**: 1800 seconds when `CACHE-CONTROL` is absent

mod message;
mod socket;

pub use message::{SsdpEvent, parse_message};
pub use socket::SsdpSocket;

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Fallback max-age when a message carries no CACHE-CONTROL header
pub const DEFAULT_MAX_AGE: u32 = 1800;

/// Search targets emitted on every search round, in order.
pub const SEARCH_TARGETS: [&str; 3] = [
    "upnp:rootdevice",
    "urn:schemas-upnp-org:device:MediaRenderer:1",
    "ssdp:all",
];

/// Extract the `uuid:...` device identity from a USN header value.
///
/// `uuid:x-y-z::upnp:rootdevice` and plain `uuid:x-y-z` both yield
/// `uuid:x-y-z`, lowercased. Returns `None` when no uuid is present.
pub fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    if let Some(idx) = lower.find("uuid:") {
        let sub = &lower[idx..];
        if let Some(end) = sub.find("::") {
            Some(sub[..end].to_string())
        } else {
            Some(sub.to_string())
        }
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_udn_strips_type_suffix() {
        assert_eq!(
            extract_udn_from_usn("uuid:ABC-123::upnp:rootdevice"),
            Some("uuid:abc-123".to_string())
        );
        assert_eq!(
            extract_udn_from_usn("uuid:abc-123"),
            Some("uuid:abc-123".to_string())
        );
        assert_eq!(extract_udn_from_usn("no-uuid-here"), None);
    }
}
