//! Construction de requêtes SOAP

use xmltree::{Element, EmitterConfig, XMLNode};

/// Builds a UPnP action request envelope.
///
/// # Arguments
///
/// * `service_urn` - service URN (ex: "urn:schemas-upnp-org:service:AVTransport:1")
/// * `action` - action name (ex: "Play")
/// * `args` - ordered (name, value) pairs; values are XML-escaped by the writer
///
/// Argument order is preserved: some renderers reject envelopes whose
/// arguments are not in SCPD order.
pub fn build_soap_request(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    build_soap_request_cdata(service_urn, action, args, &[])
}

/// Same as [`build_soap_request`], with additional arguments emitted as
/// `<![CDATA[...]]>` sections. Used for `CurrentURIMetaData`, whose
/// DIDL-Lite payload is XML itself.
pub fn build_soap_request_cdata(
    service_urn: &str,
    action: &str,
    args: &[(&str, &str)],
    cdata_args: &[(&str, &str)],
) -> Result<String, xmltree::Error> {
    // Format: <u:Action xmlns:u="service-urn">
    let mut action_elem = Element::new(action);
    action_elem.prefix = Some("u".to_string());
    action_elem
        .attributes
        .insert("xmlns:u".to_string(), service_urn.to_string());

    for (name, value) in args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::Text(value.to_string()));
        action_elem.children.push(XMLNode::Element(child));
    }
    for (name, value) in cdata_args {
        let mut child = Element::new(name);
        child.children.push(XMLNode::CData(value.to_string()));
        action_elem.children.push(XMLNode::Element(child));
    }

    let mut body = Element::new("Body");
    body.prefix = Some("s".to_string());
    body.children.push(XMLNode::Element(action_elem));

    let mut envelope = Element::new("Envelope");
    envelope.prefix = Some("s".to_string());
    envelope.attributes.insert(
        "xmlns:s".to_string(),
        "http://schemas.xmlsoap.org/soap/envelope/".to_string(),
    );
    envelope.attributes.insert(
        "s:encodingStyle".to_string(),
        "http://schemas.xmlsoap.org/soap/encoding/".to_string(),
    );
    envelope.children.push(XMLNode::Element(body));

    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf).expect("xml writer emits UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "Play",
            &[("InstanceID", "0"), ("Speed", "1")],
        )
        .unwrap();

        assert!(xml.contains("xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\""));
        assert!(xml.contains("s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\""));
        assert!(xml.contains("xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\""));
        assert!(xml.contains("<InstanceID>0</InstanceID>"));
        assert!(xml.contains("<Speed>1</Speed>"));
        // arguments stay in declaration order
        assert!(xml.find("InstanceID").unwrap() < xml.find("Speed").unwrap());
    }

    #[test]
    fn test_build_empty_request() {
        let xml = build_soap_request("urn:schemas-upnp-org:service:AVTransport:1", "Stop", &[])
            .unwrap();

        assert!(xml.contains("u:Stop"));
    }

    #[test]
    fn text_arguments_are_escaped() {
        let xml = build_soap_request(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[("CurrentURI", "http://host/a.mp4?x=1&y=<2>")],
        )
        .unwrap();

        assert!(xml.contains("http://host/a.mp4?x=1&amp;y=&lt;2>") || xml.contains("&lt;2&gt;"));
        assert!(!xml.contains("y=<2>"));
    }

    #[test]
    fn cdata_arguments_are_not_escaped() {
        let meta = r#"<DIDL-Lite><item id="0"/></DIDL-Lite>"#;
        let xml = build_soap_request_cdata(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "SetAVTransportURI",
            &[("InstanceID", "0"), ("CurrentURI", "http://host/a.mp4")],
            &[("CurrentURIMetaData", meta)],
        )
        .unwrap();

        assert!(xml.contains("<![CDATA[<DIDL-Lite><item id=\"0\"/></DIDL-Lite>]]>"));
    }
}
