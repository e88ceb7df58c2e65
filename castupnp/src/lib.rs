//! # castupnp - UPnP protocol layer
//!
//! Wire-level building blocks for a UPnP AV control point:
//!
//! - [`ssdp`] : SSDP message parsing and the multicast socket
//! - [`soap`] : SOAP envelope construction and parsing
//! - [`description`] : device description (description.xml) parsing
//! - [`time`] : `HH:MM:SS` conversions used by AVTransport
//!
//! Everything except [`ssdp::SsdpSocket`] is I/O free.

pub mod description;
pub mod soap;
pub mod ssdp;
pub mod time;

pub use description::{
    DeviceDescription, DescriptionError, ServiceDescription, normalize_manufacturer,
    resolve_service_url,
};
pub use soap::{
    SoapBody, SoapEnvelope, SoapHeader, SoapParseError, UpnpFault, build_soap_request,
    build_soap_request_cdata, parse_soap_envelope, parse_upnp_fault,
};
pub use ssdp::{SsdpEvent, SsdpSocket, extract_udn_from_usn};
pub use time::{format_hhmmss_millis, parse_hms_to_millis};
