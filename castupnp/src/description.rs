//! Parsing of the UPnP device description document (description.xml).
//!
//! Real-world descriptions are frequently non-conformant: stray
//! namespaces, vendor elements, BOM, embedded device lists. The parser is
//! therefore permissive: unknown elements are skipped, missing optional
//! fields default to empty, and tag names are matched on their lowercased
//! local name.

use std::io::BufReader;

use quick_xml::{Error as XmlError, Reader, events::Event};
use thiserror::Error;
use tracing::trace;
use url::Url;

#[derive(Debug, Error)]
pub enum DescriptionError {
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// One `<service>` entry from the description's serviceList.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDescription {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
}

impl ServiceDescription {
    /// Case-insensitive match on the service type URN.
    pub fn type_contains(&self, needle: &str) -> bool {
        self.service_type
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }
}

/// Parsed device description.
#[derive(Debug, Clone, Default)]
pub struct DeviceDescription {
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub device_type: String,
    pub services: Vec<ServiceDescription>,
}

impl DeviceDescription {
    /// Parse a description document.
    ///
    /// Identity fields come from the root `<device>`; services are
    /// collected from the root and any embedded devices (some TVs nest
    /// the MediaRenderer inside a composite device).
    pub fn parse(xml: &[u8]) -> Result<Self, DescriptionError> {
        let mut reader = Reader::from_reader(BufReader::new(xml));
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut parsed = DeviceDescription::default();

        let mut device_depth = 0u32;
        let mut in_service = false;
        let mut current_tag: Option<String> = None;
        let mut current_service = ServiceDescription::default();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let name = local_name_lower(e.name().as_ref());
                    match name.as_str() {
                        "device" => {
                            device_depth += 1;
                            current_tag = None;
                        }
                        "service" => {
                            if device_depth > 0 {
                                in_service = true;
                                current_tag = None;
                                current_service = ServiceDescription::default();
                            }
                        }
                        _ => {
                            if device_depth > 0 {
                                current_tag = Some(name);
                            }
                        }
                    }
                }
                Event::End(e) => {
                    let name = local_name_lower(e.name().as_ref());
                    match name.as_str() {
                        "device" => {
                            device_depth = device_depth.saturating_sub(1);
                        }
                        "service" => {
                            if in_service {
                                if current_service.service_type.is_empty() {
                                    trace!("Skipping service entry without serviceType");
                                } else {
                                    parsed.services.push(std::mem::take(&mut current_service));
                                }
                                in_service = false;
                            }
                        }
                        _ => {}
                    }
                    current_tag = None;
                }
                Event::Text(e) => {
                    if device_depth > 0 {
                        if let Some(tag) = &current_tag {
                            let text = e.decode().map_err(XmlError::Encoding)?;
                            let text = quick_xml::escape::unescape(&text)
                                .map(|c| c.into_owned())
                                .unwrap_or_else(|_| text.into_owned());

                            if in_service {
                                match tag.as_str() {
                                    "servicetype" => current_service.service_type = text,
                                    "serviceid" => current_service.service_id = text,
                                    "controlurl" => current_service.control_url = text,
                                    "eventsuburl" => current_service.event_sub_url = text,
                                    "scpdurl" => current_service.scpd_url = text,
                                    _ => {}
                                }
                            } else if device_depth == 1 {
                                // Root-device identity only; embedded devices keep theirs.
                                match tag.as_str() {
                                    "friendlyname" => parsed.friendly_name = text,
                                    "manufacturer" => {
                                        parsed.manufacturer = normalize_manufacturer(&text)
                                    }
                                    "modelname" => parsed.model_name = text,
                                    "devicetype" => parsed.device_type = text,
                                    _ => {}
                                }
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }

            buf.clear();
        }

        Ok(parsed)
    }

    /// Name shown to the user: friendlyName, else manufacturer + model,
    /// else "DLNA Device".
    pub fn display_name(&self) -> String {
        if !self.friendly_name.trim().is_empty() {
            return self.friendly_name.trim().to_string();
        }
        let synthesized = format!("{} {}", self.manufacturer.trim(), self.model_name.trim());
        let synthesized = synthesized.trim();
        if synthesized.is_empty() {
            "DLNA Device".to_string()
        } else {
            synthesized.to_string()
        }
    }

    /// First AVTransport service carrying a control URL.
    pub fn avtransport_service(&self) -> Option<&ServiceDescription> {
        self.service_with_type("avtransport")
    }

    /// First RenderingControl service carrying a control URL.
    pub fn rendering_control_service(&self) -> Option<&ServiceDescription> {
        self.service_with_type("renderingcontrol")
    }

    /// A device can be cast to only when it exposes an AVTransport
    /// service with a non-empty control URL.
    pub fn is_castable(&self) -> bool {
        self.avtransport_service().is_some()
    }

    fn service_with_type(&self, needle: &str) -> Option<&ServiceDescription> {
        self.services
            .iter()
            .find(|s| s.type_contains(needle) && !s.control_url.trim().is_empty())
    }
}

fn local_name_lower(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    let local = name.rsplit(':').next().unwrap_or(&name);
    local.to_ascii_lowercase()
}

/// Canonical casing for manufacturers we recognize; other values pass
/// through trimmed.
pub fn normalize_manufacturer(raw: &str) -> String {
    const KNOWN: [&str; 7] = [
        "Xiaomi",
        "Samsung",
        "LG",
        "Sony",
        "Panasonic",
        "TCL",
        "Hisense",
    ];

    let lower = raw.to_ascii_lowercase();
    for brand in KNOWN {
        if lower.contains(&brand.to_ascii_lowercase()) {
            return brand.to_string();
        }
    }
    raw.trim().to_string()
}

/// Resolve a possibly relative controlURL against the description URL.
///
/// - absolute URLs (http:// or https://) pass through;
/// - `/path` resolves against `scheme://host:port` of `description_url`;
/// - anything else resolves against the description's path prefix up to
///   the last `/`.
///
/// Falls back to the raw value when the description URL itself cannot be
/// parsed.
pub fn resolve_service_url(description_url: &str, control_url: &str) -> String {
    if control_url.starts_with("http://") || control_url.starts_with("https://") {
        return control_url.to_string();
    }

    match Url::parse(description_url).and_then(|base| base.join(control_url)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => control_url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:MediaRenderer:1</deviceType>
    <friendlyName>Living Room TV</friendlyName>
    <manufacturer>Samsung Electronics</manufacturer>
    <modelName>UE55</modelName>
    <vendorWidget>ignored</vendorWidget>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:AVTransport</serviceId>
        <controlURL>AVTransport/control</controlURL>
        <eventSubURL>AVTransport/event</eventSubURL>
        <SCPDURL>AVTransport.xml</SCPDURL>
      </service>
      <service>
        <serviceType>urn:schemas-upnp-org:service:RenderingControl:1</serviceType>
        <serviceId>urn:upnp-org:serviceId:RenderingControl</serviceId>
        <controlURL>/upnp/RenderingControl/control</controlURL>
        <eventSubURL></eventSubURL>
        <SCPDURL>RenderingControl.xml</SCPDURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn parse_extracts_identity_and_services() {
        let desc = DeviceDescription::parse(DESCRIPTION.as_bytes()).unwrap();
        assert_eq!(desc.friendly_name, "Living Room TV");
        assert_eq!(desc.manufacturer, "Samsung");
        assert_eq!(desc.model_name, "UE55");
        assert_eq!(
            desc.device_type,
            "urn:schemas-upnp-org:device:MediaRenderer:1"
        );
        assert_eq!(desc.services.len(), 2);
        assert_eq!(desc.services[0].control_url, "AVTransport/control");
        assert_eq!(desc.services[0].scpd_url, "AVTransport.xml");
        assert!(desc.is_castable());
    }

    #[test]
    fn parse_tolerates_missing_fields_and_unknown_elements() {
        let xml = r#"<root><device><unknown><deep/></unknown></device></root>"#;
        let desc = DeviceDescription::parse(xml.as_bytes()).unwrap();
        assert!(desc.friendly_name.is_empty());
        assert!(desc.services.is_empty());
        assert_eq!(desc.display_name(), "DLNA Device");
        assert!(!desc.is_castable());
    }

    #[test]
    fn display_name_synthesis() {
        let mut desc = DeviceDescription::default();
        desc.manufacturer = "Sony".into();
        desc.model_name = "Bravia".into();
        assert_eq!(desc.display_name(), "Sony Bravia");

        desc.friendly_name = "Bedroom".into();
        assert_eq!(desc.display_name(), "Bedroom");
    }

    #[test]
    fn services_from_embedded_devices_are_collected() {
        let xml = r#"<root><device>
          <friendlyName>Composite</friendlyName>
          <deviceList><device>
            <friendlyName>Inner</friendlyName>
            <serviceList><service>
              <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
              <controlURL>/ctl</controlURL>
            </service></serviceList>
          </device></deviceList>
        </device></root>"#;
        let desc = DeviceDescription::parse(xml.as_bytes()).unwrap();
        // root identity wins, inner services still count
        assert_eq!(desc.friendly_name, "Composite");
        assert!(desc.is_castable());
    }

    #[test]
    fn control_url_entities_are_unescaped() {
        let xml = r#"<root><device><serviceList><service>
          <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
          <controlURL>/ctl?a=1&amp;b=2</controlURL>
        </service></serviceList></device></root>"#;
        let desc = DeviceDescription::parse(xml.as_bytes()).unwrap();
        assert_eq!(desc.services[0].control_url, "/ctl?a=1&b=2");
    }

    #[test]
    fn normalize_known_manufacturers() {
        assert_eq!(normalize_manufacturer("SAMSUNG ELECTRONICS"), "Samsung");
        assert_eq!(normalize_manufacturer("lg electronics inc."), "LG");
        assert_eq!(normalize_manufacturer("Acme Corp"), "Acme Corp");
    }

    #[test]
    fn resolve_relative_control_url() {
        assert_eq!(
            resolve_service_url("http://192.168.1.20:49152/desc.xml", "AVTransport/control"),
            "http://192.168.1.20:49152/AVTransport/control"
        );
    }

    #[test]
    fn resolve_root_relative_control_url() {
        assert_eq!(
            resolve_service_url(
                "http://192.168.1.20:49152/dev/desc.xml",
                "/upnp/control/AVTransport1"
            ),
            "http://192.168.1.20:49152/upnp/control/AVTransport1"
        );
    }

    #[test]
    fn resolve_path_relative_keeps_prefix() {
        assert_eq!(
            resolve_service_url("http://h:80/a/b/desc.xml", "ctl"),
            "http://h/a/b/ctl"
        );
    }

    #[test]
    fn resolve_absolute_passes_through() {
        assert_eq!(
            resolve_service_url("http://h/desc.xml", "http://other:9000/ctl"),
            "http://other:9000/ctl"
        );
    }
}
