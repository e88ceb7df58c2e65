//! Extraction des SOAP Faults UPnP

use super::SoapEnvelope;
use super::parser::{child_text, find_child_with_suffix};

/// Erreur UPnP extraite d'un SOAP Fault.
///
/// Schéma typique (SOAP 1.1) :
///
/// ```xml
/// <s:Body>
///   <s:Fault>
///     <faultcode>...</faultcode>
///     <faultstring>...</faultstring>
///     <detail>
///       <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
///         <errorCode>401</errorCode>
///         <errorDescription>Invalid Action</errorDescription>
///       </UPnPError>
///     </detail>
///   </s:Fault>
/// </s:Body>
/// ```
#[derive(Debug, Clone)]
pub struct UpnpFault {
    pub error_code: u32,
    pub error_description: String,
}

/// Parse un éventuel SOAP Fault contenant un UPnPError.
pub fn parse_upnp_fault(envelope: &SoapEnvelope) -> Option<UpnpFault> {
    let fault = find_child_with_suffix(&envelope.body.content, "Fault")?;
    let detail = find_child_with_suffix(fault, "detail")?;
    let upnp_error = find_child_with_suffix(detail, "UPnPError")?;

    // errorCode (obligatoire dans la spec)
    let error_code = child_text(upnp_error, "errorCode")?.parse::<u32>().ok()?;

    // errorDescription (optionnel, mais utile)
    let error_description = child_text(upnp_error, "errorDescription").unwrap_or_default();

    Some(UpnpFault {
        error_code,
        error_description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::parse_soap_envelope;

    const FAULT: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <faultstring>UPnPError</faultstring>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>718</errorCode>
          <errorDescription>Invalid InstanceID</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn parse_fault_extracts_error_code_and_description() {
        let envelope = parse_soap_envelope(FAULT.as_bytes()).unwrap();
        let fault = parse_upnp_fault(&envelope).expect("Expected UPnPError");
        assert_eq!(fault.error_code, 718);
        assert_eq!(fault.error_description, "Invalid InstanceID");
    }

    #[test]
    fn no_fault_in_normal_response() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body><u:PlayResponse xmlns:u="urn:schemas-upnp-org:service:AVTransport:1"/></s:Body>
</s:Envelope>"#;
        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert!(parse_upnp_fault(&envelope).is_none());
    }
}
