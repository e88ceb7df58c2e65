//! Structures de l'enveloppe SOAP

use xmltree::Element;

/// Enveloppe SOAP complète
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// En-tête SOAP optionnel
    pub header: Option<SoapHeader>,

    /// Corps SOAP contenant l'action ou la réponse
    pub body: SoapBody,
}

/// En-tête SOAP
#[derive(Debug, Clone)]
pub struct SoapHeader {
    pub content: Element,
}

/// Corps SOAP
#[derive(Debug, Clone)]
pub struct SoapBody {
    pub content: Element,
}

impl SoapEnvelope {
    pub fn new(body: SoapBody) -> Self {
        Self { header: None, body }
    }

    /// The `<Action>Response` element for `action`, if the body holds one.
    pub fn action_response(&self, action: &str) -> Option<&Element> {
        let wanted = format!("{action}Response");
        self.body.content.children.iter().find_map(|node| {
            node.as_element()
                .filter(|elem| elem.name.ends_with(&wanted))
        })
    }
}
