//! UPnP SOAP action invocation.
//!
//! The HTTP leg sits behind [`SoapTransport`] so the media controller's
//! retry and ordering behavior can be exercised without a renderer on
//! the network.

use tracing::trace;
use xmltree::Element;

use castupnp::soap::{
    SoapEnvelope, build_soap_request_cdata, child_text, find_child_with_suffix,
    parse_soap_envelope, parse_upnp_fault,
};

use crate::errors::CastError;

/// Raw HTTP reply to a SOAP POST.
#[derive(Debug, Clone)]
pub struct SoapHttpReply {
    pub status: u16,
    pub body: String,
}

/// The one seam between SOAP logic and the network.
pub trait SoapTransport: Send + Sync {
    /// POST `body` to `url` with the given (already quoted) SOAPAction.
    fn post(&self, url: &str, soap_action: &str, body: &str) -> Result<SoapHttpReply, CastError>;
}

/// Result of a SOAP call:
/// - HTTP status code
/// - raw XML body (always)
/// - parsed SOAP envelope if parsing succeeded
pub struct SoapCallResult {
    pub status: u16,
    pub raw_body: String,
    pub envelope: Option<SoapEnvelope>,
}

/// Invoke a UPnP SOAP action on a control URL.
///
/// - `control_url`: full HTTP URL of the service control endpoint
/// - `service_type`: service URN
/// - `action`: action name
/// - `args`: list of (name, value); `cdata_args` are emitted as CDATA
pub fn invoke_upnp_action(
    transport: &dyn SoapTransport,
    control_url: &str,
    service_type: &str,
    action: &str,
    args: &[(&str, &str)],
    cdata_args: &[(&str, &str)],
) -> Result<SoapCallResult, CastError> {
    let body_xml = build_soap_request_cdata(service_type, action, args, cdata_args)
        .map_err(|e| CastError::Protocol(format!("failed to build SOAP request: {e}")))?;

    // SOAPAction carries the surrounding double quotes on the wire.
    let soap_action = format!(r#""{}#{}""#, service_type, action);

    let reply = transport.post(control_url, &soap_action, &body_xml)?;

    // Parsing is non-fatal here: fault extraction wants the envelope even
    // on 500, and callers decide what a missing envelope means.
    let envelope = match parse_soap_envelope(reply.body.as_bytes()) {
        Ok(env) => Some(env),
        Err(e) => {
            trace!("SOAP response for {} did not parse: {}", action, e);
            None
        }
    };

    Ok(SoapCallResult {
        status: reply.status,
        raw_body: reply.body,
        envelope,
    })
}

/// Success check for actions without return values (Play, Stop, ...).
pub fn handle_action_response(action: &str, call: &SoapCallResult) -> Result<(), CastError> {
    if let Some(env) = &call.envelope {
        if let Some(fault) = parse_upnp_fault(env) {
            return Err(CastError::UpnpFault {
                action: action.to_string(),
                code: fault.error_code,
                description: fault.error_description,
            });
        }
    }

    if !(200..300).contains(&call.status) {
        return Err(CastError::HttpStatus {
            status: call.status,
            url: action.to_string(),
        });
    }

    Ok(())
}

/// The `<action>Response` element of a query reply, after status and
/// fault checks.
pub fn response_element<'a>(
    action: &str,
    call: &'a SoapCallResult,
) -> Result<&'a Element, CastError> {
    handle_action_response(action, call)?;

    let envelope = call
        .envelope
        .as_ref()
        .ok_or_else(|| CastError::malformed(format!("missing SOAP envelope in {action} reply")))?;

    envelope
        .action_response(action)
        .ok_or_else(|| CastError::malformed(format!("missing {action}Response element")))
}

/// Text of a named return value inside a response element; empty string
/// when the element is absent (renderers omit optional values).
pub fn response_text(response: &Element, name: &str) -> String {
    child_text(response, name).unwrap_or_default()
}

/// Required named return value; missing element is a malformed response.
pub fn required_response_text(response: &Element, name: &str) -> Result<String, CastError> {
    find_child_with_suffix(response, name)
        .and_then(|elem| elem.get_text())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| CastError::malformed(format!("missing {name} element in SOAP body")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(status: u16, body: &str) -> SoapCallResult {
        SoapCallResult {
            status,
            raw_body: body.to_string(),
            envelope: parse_soap_envelope(body.as_bytes()).ok(),
        }
    }

    const VOLUME_REPLY: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
      <CurrentVolume>37</CurrentVolume>
    </u:GetVolumeResponse>
  </s:Body>
</s:Envelope>"#;

    const FAULT_REPLY: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <s:Fault>
      <faultcode>s:Client</faultcode>
      <detail>
        <UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
          <errorCode>702</errorCode>
          <errorDescription>No such object</errorDescription>
        </UPnPError>
      </detail>
    </s:Fault>
  </s:Body>
</s:Envelope>"#;

    #[test]
    fn successful_query_reply() {
        let call = call(200, VOLUME_REPLY);
        let response = response_element("GetVolume", &call).unwrap();
        assert_eq!(required_response_text(response, "CurrentVolume").unwrap(), "37");
    }

    #[test]
    fn fault_wins_over_status() {
        let call = call(500, FAULT_REPLY);
        match handle_action_response("Play", &call) {
            Err(CastError::UpnpFault { code, .. }) => assert_eq!(code, 702),
            other => panic!("expected UpnpFault, got {:?}", other.err()),
        }
    }

    #[test]
    fn non_2xx_without_fault_is_http_error() {
        let call = call(500, "internal error");
        assert!(matches!(
            handle_action_response("Play", &call),
            Err(CastError::HttpStatus { status: 500, .. })
        ));
    }

    #[test]
    fn missing_response_element_is_malformed() {
        let call = call(200, VOLUME_REPLY);
        assert!(matches!(
            response_element("GetMute", &call),
            Err(CastError::MalformedResponse(_))
        ));
    }
}
