//! Parsing des réponses SOAP

use std::io::BufReader;

use xmltree::{Element, XMLNode};

use super::{SoapBody, SoapEnvelope, SoapHeader};

/// Erreur de parsing SOAP
#[derive(Debug, thiserror::Error)]
pub enum SoapParseError {
    #[error("XML parse error: {0}")]
    XmlError(#[from] xmltree::ParseError),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,
}

/// Parse une enveloppe SOAP complète.
///
/// Namespace prefixes vary across renderers (`s:`, `SOAP-ENV:`, none), so
/// elements are matched on local-name suffix.
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapParseError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapParseError::MissingEnvelope);
    }

    let header = root
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Header")))
        .map(|e| SoapHeader { content: e.clone() });

    let body_elem = root
        .children
        .iter()
        .find_map(|n| n.as_element().filter(|e| e.name.ends_with("Body")))
        .ok_or(SoapParseError::MissingBody)?;

    Ok(SoapEnvelope {
        header,
        body: SoapBody {
            content: body_elem.clone(),
        },
    })
}

/// First child element whose local name ends with `suffix`.
pub fn find_child_with_suffix<'a>(parent: &'a Element, suffix: &str) -> Option<&'a Element> {
    parent.children.iter().find_map(|node| match node {
        XMLNode::Element(elem) if elem.name.ends_with(suffix) => Some(elem),
        _ => None,
    })
}

/// Trimmed text content of the child element named `suffix`, if any.
pub fn child_text(parent: &Element, suffix: &str) -> Option<String> {
    find_child_with_suffix(parent, suffix)
        .and_then(|elem| elem.get_text())
        .map(|t| t.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_envelope() {
        let xml = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/">
  <s:Body>
    <u:GetVolumeResponse xmlns:u="urn:schemas-upnp-org:service:RenderingControl:1">
      <CurrentVolume>42</CurrentVolume>
    </u:GetVolumeResponse>
  </s:Body>
</s:Envelope>"#;

        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        let response = envelope.action_response("GetVolume").unwrap();
        assert_eq!(child_text(response, "CurrentVolume").as_deref(), Some("42"));
    }

    #[test]
    fn test_parse_with_other_prefix() {
        let xml = r#"<?xml version="1.0"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Body>
    <m:PauseResponse xmlns:m="urn:schemas-upnp-org:service:AVTransport:1"/>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

        let envelope = parse_soap_envelope(xml.as_bytes()).unwrap();
        assert!(envelope.action_response("Pause").is_some());
    }

    #[test]
    fn test_missing_body() {
        let xml = r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/"/>"#;
        assert!(matches!(
            parse_soap_envelope(xml.as_bytes()),
            Err(SoapParseError::MissingBody)
        ));
    }

    #[test]
    fn test_not_an_envelope() {
        let xml = r#"<html><body>404</body></html>"#;
        assert!(matches!(
            parse_soap_envelope(xml.as_bytes()),
            Err(SoapParseError::MissingEnvelope)
        ));
    }
}
