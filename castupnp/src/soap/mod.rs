//! # Module SOAP - Simple Object Access Protocol
//!
//! SOAP support for the control-point side of UPnP: building action
//! request envelopes and parsing action responses (including UPnP
//! faults).
//!
//! ## Architecture
//!
//! - [`SoapEnvelope`] : parsed SOAP envelope
//! - [`build_soap_request`] : action request construction
//! - [`parse_soap_envelope`] : tolerant response parsing
//! - [`UpnpFault`] : `UPnPError` extracted from a SOAP Fault
//!
//! ## Example
//!
//! ```
//! use castupnp::soap::{build_soap_request, parse_soap_envelope};
//!
//! let xml = build_soap_request(
//!     "urn:schemas-upnp-org:service:AVTransport:1",
//!     "Play",
//!     &[("InstanceID", "0"), ("Speed", "1")],
//! )
//! .unwrap();
//! assert!(xml.contains("u:Play"));
//!
//! let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
//! assert!(envelope.body.content.name.ends_with("Body"));
//! ```

mod builder;
mod envelope;
mod fault;
mod parser;

pub use builder::{build_soap_request, build_soap_request_cdata};
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use fault::{UpnpFault, parse_upnp_fault};
pub use parser::{SoapParseError, child_text, find_child_with_suffix, parse_soap_envelope};
