//! SOAP / WS-Management envelope codec
//!
//! Builds request envelopes from an [`Operation`] and [`RequestHeaders`], and
//! parses response envelopes into an [`Envelope`] whose body is kept as raw
//! XML for the operation-specific parser.
//!
//! # Header layout
//!
//! Addressed requests carry the WS-Addressing and WS-Management headers in a
//! fixed order:
//!
//! ```text
//! a:To, a:ReplyTo, w:MaxEnvelopeSize, a:MessageID, p:SessionId, w:Locale,
//! p:DataLocale, w:OperationTimeout, w:ResourceURI, a:Action
//! ```
//!
//! Operations without an action (Identify) are unaddressed and serialize an
//! empty `<s:Header/>`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;
use uuid::Uuid;

use crate::config::WinRmConfig;
use crate::error::{WinRmError, WinRmResult};

// ============================================================================
// Constants
// ============================================================================

/// SOAP 1.2 envelope namespace
pub const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
/// WS-Addressing namespace
pub const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
/// DMTF WS-Management namespace
pub const WSMAN_NS: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
/// Microsoft WS-Management extensions namespace
pub const MS_WSMAN_NS: &str = "http://schemas.microsoft.com/wbem/wsman/1/wsman.xsd";
/// WS-Management identity namespace
pub const WSMID_NS: &str = "http://schemas.dmtf.org/wbem/wsman/identity/1/wsmanidentity.xsd";

/// Anonymous reply-to address
pub const ANONYMOUS_ADDRESS: &str =
    "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

// ============================================================================
// Operations
// ============================================================================

/// A WS-Management request kind.
///
/// Implementors supply the action, resource and body; the codec supplies the
/// envelope and headers, so new operations plug in without touching the frame
/// codec or the transports.
pub trait Operation: Send + Sync {
    /// WS-Addressing action URI. `None` marks an unaddressed request.
    fn action(&self) -> Option<&str>;

    /// WS-Management resource URI
    fn resource_uri(&self) -> Option<&str> {
        None
    }

    /// Extra namespace prefixes used by the body
    fn namespaces(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }

    /// Body fragment placed inside `s:Body`
    fn body(&self) -> String;
}

/// Per-client values used to fill request headers
#[derive(Debug, Clone)]
pub struct RequestHeaders {
    /// Endpoint URL for `a:To`
    pub to: String,
    /// Operation timeout for `w:OperationTimeout`
    pub operation_timeout: Duration,
    /// Locale for `w:Locale` / `p:DataLocale`
    pub locale: String,
    /// Value for `w:MaxEnvelopeSize`
    pub max_envelope_size: u32,
    /// Optional `p:SessionId`
    pub session_id: Option<Uuid>,
}

impl RequestHeaders {
    /// Header values for an endpoint with protocol defaults
    pub fn new(to: impl Into<String>) -> Self {
        Self::from_config(&WinRmConfig::new(to))
    }

    /// Header values taken from a client configuration
    pub fn from_config(config: &WinRmConfig) -> Self {
        Self {
            to: config.endpoint.clone(),
            operation_timeout: config.operation_timeout,
            locale: config.locale.clone(),
            max_envelope_size: config.max_envelope_size,
            session_id: None,
        }
    }

    /// Attach a session id
    pub fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// SOAP header fields. Absent fields are not serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub to: Option<String>,
    pub reply_to: Option<String>,
    pub max_envelope_size: Option<u32>,
    pub message_id: Option<String>,
    pub relates_to: Option<String>,
    pub session_id: Option<String>,
    pub locale: Option<String>,
    pub operation_timeout: Option<String>,
    pub resource_uri: Option<String>,
    pub action: Option<String>,
}

impl EnvelopeHeader {
    /// True when no header field is set
    pub fn is_empty(&self) -> bool {
        *self == EnvelopeHeader::default()
    }
}

/// A SOAP fault carried in a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    pub code: String,
    pub subcode: Option<String>,
    pub reason: String,
}

impl From<SoapFault> for WinRmError {
    fn from(fault: SoapFault) -> Self {
        WinRmError::Fault {
            code: fault.code,
            subcode: fault.subcode,
            reason: fault.reason,
        }
    }
}

/// A SOAP envelope: header fields, raw body XML and declared prefixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    /// Inner XML of `s:Body`
    pub body: String,
    namespaces: Vec<(String, String)>,
}

impl Envelope {
    /// Create an envelope with only the SOAP prefix declared
    pub fn new(header: EnvelopeHeader, body: impl Into<String>) -> Self {
        Self {
            header,
            body: body.into(),
            namespaces: vec![("s".to_string(), SOAP_ENV_NS.to_string())],
        }
    }

    /// Declared namespace prefixes, in declaration order
    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    /// Declare a prefix on the root element. Redeclaring a prefix is a no-op.
    pub fn declare_namespace(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        let prefix = prefix.into();
        if !self.namespaces.iter().any(|(p, _)| *p == prefix) {
            self.namespaces.push((prefix, uri.into()));
        }
    }

    /// Serialize the envelope
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<s:Envelope");
        for (prefix, uri) in &self.namespaces {
            if prefix.is_empty() {
                xml.push_str(&format!(" xmlns=\"{}\"", xml_escape(uri)));
            } else {
                xml.push_str(&format!(" xmlns:{}=\"{}\"", prefix, xml_escape(uri)));
            }
        }
        xml.push('>');
        xml.push_str(&self.header_xml());
        if self.body.is_empty() {
            xml.push_str("<s:Body/>");
        } else {
            xml.push_str("<s:Body>");
            xml.push_str(&self.body);
            xml.push_str("</s:Body>");
        }
        xml.push_str("</s:Envelope>");
        xml
    }

    /// Serialize the envelope to UTF-8 bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_xml().into_bytes()
    }

    fn header_xml(&self) -> String {
        let h = &self.header;
        if h.is_empty() {
            return "<s:Header/>".to_string();
        }

        let mut xml = String::from("<s:Header>");
        if let Some(to) = &h.to {
            xml.push_str(&format!("<a:To>{}</a:To>", xml_escape(to)));
        }
        if let Some(reply_to) = &h.reply_to {
            xml.push_str(&format!(
                r#"<a:ReplyTo><a:Address s:mustUnderstand="true">{}</a:Address></a:ReplyTo>"#,
                xml_escape(reply_to)
            ));
        }
        if let Some(size) = h.max_envelope_size {
            xml.push_str(&format!(
                r#"<w:MaxEnvelopeSize s:mustUnderstand="true">{}</w:MaxEnvelopeSize>"#,
                size
            ));
        }
        if let Some(id) = &h.message_id {
            xml.push_str(&format!("<a:MessageID>{}</a:MessageID>", xml_escape(id)));
        }
        if let Some(id) = &h.relates_to {
            xml.push_str(&format!("<a:RelatesTo>{}</a:RelatesTo>", xml_escape(id)));
        }
        if let Some(session) = &h.session_id {
            xml.push_str(&format!(
                r#"<p:SessionId s:mustUnderstand="false">{}</p:SessionId>"#,
                xml_escape(session)
            ));
        }
        if let Some(locale) = &h.locale {
            let locale = xml_escape(locale);
            xml.push_str(&format!(
                r#"<w:Locale xml:lang="{0}" s:mustUnderstand="false"/><p:DataLocale xml:lang="{0}" s:mustUnderstand="false"/>"#,
                locale
            ));
        }
        if let Some(timeout) = &h.operation_timeout {
            xml.push_str(&format!(
                "<w:OperationTimeout>{}</w:OperationTimeout>",
                xml_escape(timeout)
            ));
        }
        if let Some(uri) = &h.resource_uri {
            xml.push_str(&format!(
                r#"<w:ResourceURI s:mustUnderstand="true">{}</w:ResourceURI>"#,
                xml_escape(uri)
            ));
        }
        if let Some(action) = &h.action {
            xml.push_str(&format!(
                r#"<a:Action s:mustUnderstand="true">{}</a:Action>"#,
                xml_escape(action)
            ));
        }
        xml.push_str("</s:Header>");
        xml
    }

    /// SOAP fault in the body, if any
    pub fn fault(&self) -> Option<SoapFault> {
        let nodes = body_nodes(&self.body);
        if !nodes.iter().any(|n| n.name() == "Fault") {
            return None;
        }

        let text_at = |parent: &str, child: &str| {
            nodes
                .iter()
                .find(|n| n.name() == child && n.parent() == Some(parent) && !n.text.is_empty())
                .map(|n| n.text.clone())
        };

        let code = nodes
            .iter()
            .find(|n| n.name() == "Value" && n.parent() == Some("Code"))
            .map(|n| n.text.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let subcode = text_at("Subcode", "Value");
        let reason = text_at("WSManFault", "Message")
            .or_else(|| text_at("Reason", "Text"))
            .unwrap_or_default();

        Some(SoapFault {
            code,
            subcode,
            reason,
        })
    }

    /// Text of every body element with this local name, in document order
    pub fn body_text(&self, local_name: &str) -> Vec<String> {
        body_nodes(&self.body)
            .into_iter()
            .filter(|n| n.name() == local_name)
            .map(|n| n.text)
            .collect()
    }

    /// Whether the body contains an element with this local name
    pub fn body_contains(&self, local_name: &str) -> bool {
        body_nodes(&self.body).iter().any(|n| n.name() == local_name)
    }
}

/// Build a request envelope for an operation.
///
/// Addressed operations get a fresh `uuid:` message id on every call.
pub fn build_envelope(operation: &dyn Operation, headers: &RequestHeaders) -> Envelope {
    let mut envelope = Envelope::new(EnvelopeHeader::default(), operation.body());

    if let Some(action) = operation.action() {
        envelope.declare_namespace("a", WSA_NS);
        envelope.declare_namespace("w", WSMAN_NS);
        envelope.declare_namespace("p", MS_WSMAN_NS);
        envelope.header = EnvelopeHeader {
            to: Some(headers.to.clone()),
            reply_to: Some(ANONYMOUS_ADDRESS.to_string()),
            max_envelope_size: Some(headers.max_envelope_size),
            message_id: Some(new_message_id()),
            relates_to: None,
            session_id: headers.session_id.map(format_uuid),
            locale: Some(headers.locale.clone()),
            operation_timeout: Some(format!("PT{}S", headers.operation_timeout.as_secs())),
            resource_uri: operation.resource_uri().map(str::to_string),
            action: Some(action.to_string()),
        };
    }

    for (prefix, uri) in operation.namespaces() {
        envelope.declare_namespace(prefix, uri);
    }

    envelope
}

fn new_message_id() -> String {
    format_uuid(Uuid::new_v4())
}

fn format_uuid(id: Uuid) -> String {
    format!("uuid:{}", id.to_string().to_uppercase())
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse and validate a response envelope.
///
/// Fails with [`WinRmError::MalformedEnvelope`] when the input is not UTF-8,
/// not well-formed XML, not rooted at `Envelope`, or has no `Body`.
pub fn parse_envelope(bytes: &[u8]) -> WinRmResult<Envelope> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| WinRmError::MalformedEnvelope(format!("response is not UTF-8: {}", e)))?;

    let mut reader = Reader::from_str(text);
    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;
    let mut header = EnvelopeHeader::default();
    let mut namespaces = Vec::new();
    let mut body_start: Option<usize> = None;
    let mut body: Option<String> = None;
    let mut field_text = String::new();

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event()?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let name = local_name(e);
                let is_empty = matches!(event, Event::Empty(_));

                if stack.is_empty() {
                    if seen_root {
                        return Err(WinRmError::MalformedEnvelope(
                            "multiple root elements".to_string(),
                        ));
                    }
                    if name != "Envelope" {
                        return Err(WinRmError::MalformedEnvelope(format!(
                            "root element is '{}', expected 'Envelope'",
                            name
                        )));
                    }
                    seen_root = true;
                    namespaces = namespace_declarations(e)?;
                } else if stack.len() == 1 && name == "Body" {
                    if is_empty {
                        body = Some(String::new());
                    } else {
                        body_start = Some(reader.buffer_position());
                    }
                } else if stack.len() == 2 && stack[1] == "Header" && name == "Locale" {
                    header.locale = attribute(e, b"xml:lang")?;
                }

                if !is_empty {
                    stack.push(name);
                    field_text.clear();
                }
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                if stack.len() == 1 && name == "Body" {
                    if let Some(start) = body_start.take() {
                        body = Some(text[start..position].to_string());
                    }
                } else if in_header_field(&stack) {
                    set_header_field(&mut header, &stack, &name, field_text.trim());
                }
                field_text.clear();
            }
            Event::Text(t) => {
                if in_header(&stack) {
                    let unescaped = t
                        .unescape()
                        .map_err(|e| WinRmError::MalformedEnvelope(e.to_string()))?;
                    field_text.push_str(&unescaped);
                }
            }
            Event::CData(c) => {
                if in_header(&stack) {
                    field_text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(WinRmError::MalformedEnvelope(format!(
            "unclosed element '{}'",
            stack.last().map(String::as_str).unwrap_or_default()
        )));
    }
    if !seen_root {
        return Err(WinRmError::MalformedEnvelope("empty document".to_string()));
    }
    let body = body.ok_or_else(|| {
        WinRmError::MalformedEnvelope("envelope has no SOAP Body element".to_string())
    })?;

    Ok(Envelope {
        header,
        body,
        namespaces,
    })
}

fn in_header(stack: &[String]) -> bool {
    stack.len() >= 3 && stack[1] == "Header"
}

// After popping the closed element, a direct header child leaves
// [Envelope, Header]; ReplyTo/Address leaves [Envelope, Header, ReplyTo].
fn in_header_field(stack: &[String]) -> bool {
    (stack.len() == 2 || stack.len() == 3) && stack[1] == "Header"
}

fn set_header_field(header: &mut EnvelopeHeader, stack: &[String], name: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let value = Some(value.to_string());
    if stack.len() == 3 {
        if stack[2] == "ReplyTo" && name == "Address" {
            header.reply_to = value;
        }
        return;
    }
    match name {
        "To" => header.to = value,
        "MessageID" => header.message_id = value,
        "RelatesTo" => header.relates_to = value,
        "SessionId" => header.session_id = value,
        "OperationTimeout" => header.operation_timeout = value,
        "ResourceURI" => header.resource_uri = value,
        "Action" => header.action = value,
        "MaxEnvelopeSize" => header.max_envelope_size = value.and_then(|v| v.parse().ok()),
        _ => {}
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> WinRmResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| WinRmError::MalformedEnvelope(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| WinRmError::MalformedEnvelope(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn namespace_declarations(e: &BytesStart<'_>) -> WinRmResult<Vec<(String, String)>> {
    let mut namespaces = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| WinRmError::MalformedEnvelope(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let prefix = if key == "xmlns" {
            String::new()
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            prefix.to_string()
        } else {
            continue;
        };
        let uri = attr
            .unescape_value()
            .map_err(|e| WinRmError::MalformedEnvelope(e.to_string()))?;
        namespaces.push((prefix, uri.into_owned()));
    }
    Ok(namespaces)
}

/// An element of a body fragment: its local-name path and trimmed text
struct BodyNode {
    path: Vec<String>,
    text: String,
}

impl BodyNode {
    fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    fn parent(&self) -> Option<&str> {
        self.path.len().checked_sub(2).map(|i| self.path[i].as_str())
    }
}

/// Flatten a body fragment into elements in document order.
///
/// The fragment was validated as part of the whole document, so a parse
/// error here only truncates the walk.
fn body_nodes(fragment: &str) -> Vec<BodyNode> {
    let mut reader = Reader::from_str(fragment);
    let mut nodes: Vec<BodyNode> = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                path.push(local_name(&e));
                open.push(nodes.len());
                nodes.push(BodyNode {
                    path: path.clone(),
                    text: String::new(),
                });
            }
            Ok(Event::Empty(e)) => {
                let mut node_path = path.clone();
                node_path.push(local_name(&e));
                nodes.push(BodyNode {
                    path: node_path,
                    text: String::new(),
                });
            }
            Ok(Event::End(_)) => {
                if let Some(index) = open.pop() {
                    let trimmed = nodes[index].text.trim().to_string();
                    nodes[index].text = trimmed;
                }
                path.pop();
            }
            Ok(Event::Text(t)) => {
                if let (Some(&index), Ok(text)) = (open.last(), t.unescape()) {
                    nodes[index].text.push_str(&text);
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(&index) = open.last() {
                    nodes[index]
                        .text
                        .push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            Ok(_) => {}
        }
    }

    nodes
}

/// Escape special characters for XML
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct GetOperation;

    impl Operation for GetOperation {
        fn action(&self) -> Option<&str> {
            Some("http://schemas.xmlsoap.org/ws/2004/09/transfer/Get")
        }

        fn resource_uri(&self) -> Option<&str> {
            Some("http://schemas.microsoft.com/wbem/wsman/1/wmi/root/cimv2/Win32_Service")
        }

        fn body(&self) -> String {
            String::new()
        }
    }

    struct Unaddressed;

    impl Operation for Unaddressed {
        fn action(&self) -> Option<&str> {
            None
        }

        fn namespaces(&self) -> Vec<(&'static str, &'static str)> {
            vec![("wsmid", WSMID_NS)]
        }

        fn body(&self) -> String {
            "<wsmid:Identify/>".to_string()
        }
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("hello"), "hello");
        assert_eq!(xml_escape("<script>"), "&lt;script&gt;");
        assert_eq!(xml_escape("a & b"), "a &amp; b");
        assert_eq!(xml_escape("\"quoted\""), "&quot;quoted&quot;");
    }

    #[test]
    fn test_unaddressed_envelope_has_empty_header() {
        let envelope = build_envelope(&Unaddressed, &RequestHeaders::new("http://host/wsman"));
        assert_eq!(
            envelope.to_xml(),
            format!(
                r#"<s:Envelope xmlns:s="{}" xmlns:wsmid="{}"><s:Header/><s:Body><wsmid:Identify/></s:Body></s:Envelope>"#,
                SOAP_ENV_NS, WSMID_NS
            )
        );
    }

    #[test]
    fn test_addressed_header_order() {
        let headers = RequestHeaders::new("http://host:5985/wsman")
            .with_session_id(Uuid::new_v4());
        let xml = build_envelope(&GetOperation, &headers).to_xml();

        let order = [
            "<a:To>",
            "<a:ReplyTo>",
            "<w:MaxEnvelopeSize",
            "<a:MessageID>uuid:",
            "<p:SessionId",
            "<w:Locale xml:lang=\"en-US\"",
            "<p:DataLocale",
            "<w:OperationTimeout>PT20S<",
            "<w:ResourceURI",
            "<a:Action",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|tag| xml.find(tag).unwrap_or_else(|| panic!("missing {}", tag)))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", xml);
        assert!(xml.contains("<s:Body/>"));
    }

    #[test]
    fn test_message_ids_are_fresh() {
        let headers = RequestHeaders::new("http://host/wsman");
        let a = build_envelope(&GetOperation, &headers);
        let b = build_envelope(&GetOperation, &headers);
        assert_ne!(a.header.message_id, b.header.message_id);
    }

    #[test]
    fn test_built_envelope_parses_back() {
        let headers = RequestHeaders::new("http://host:5985/wsman?a=1&b=2");
        let built = build_envelope(&GetOperation, &headers);
        let parsed = parse_envelope(&built.to_bytes()).unwrap();

        assert_eq!(parsed.header, built.header);
        assert_eq!(parsed.namespaces(), built.namespaces());
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_parse_keeps_raw_body() {
        let xml = format!(
            r#"<s:Envelope xmlns:s="{}"><s:Header/><s:Body><x:Thing xmlns:x="urn:x">a &amp; b</x:Thing></s:Body></s:Envelope>"#,
            SOAP_ENV_NS
        );
        let envelope = parse_envelope(xml.as_bytes()).unwrap();
        assert_eq!(envelope.body, r#"<x:Thing xmlns:x="urn:x">a &amp; b</x:Thing>"#);
        assert_eq!(envelope.body_text("Thing"), vec!["a & b".to_string()]);
        assert!(envelope.header.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let cases: &[&[u8]] = &[
            b"",
            b"not xml at all",
            b"<s:Envelope xmlns:s=\"x\"><s:Body></s:Envelope>",
            b"<s:Envelope xmlns:s=\"x\"><s:Body>",
            b"<s:Envelope xmlns:s=\"x\"><s:Header/></s:Envelope>",
            b"<Other><Body/></Other>",
            b"\xff\xfe<s:Envelope/>",
        ];
        for case in cases {
            let result = parse_envelope(case);
            assert!(
                matches!(result, Err(WinRmError::MalformedEnvelope(_))),
                "accepted {:?}",
                String::from_utf8_lossy(case)
            );
        }
    }

    #[test]
    fn test_fault_detection() {
        let xml = format!(
            r#"<s:Envelope xmlns:s="{}" xmlns:w="{}"><s:Header/><s:Body><s:Fault>
            <s:Code><s:Value>s:Sender</s:Value><s:Subcode><s:Value>w:SchemaValidationError</s:Value></s:Subcode></s:Code>
            <s:Reason><s:Text xml:lang="en-US">The SOAP XML in the message does not match the corresponding XML schema definition.</s:Text></s:Reason>
            </s:Fault></s:Body></s:Envelope>"#,
            SOAP_ENV_NS, WSMAN_NS
        );
        let fault = parse_envelope(xml.as_bytes()).unwrap().fault().unwrap();
        assert_eq!(fault.code, "s:Sender");
        assert_eq!(fault.subcode.as_deref(), Some("w:SchemaValidationError"));
        assert!(fault.reason.starts_with("The SOAP XML"));
    }

    #[test]
    fn test_fault_prefers_wsman_message() {
        let xml = format!(
            r#"<s:Envelope xmlns:s="{}"><s:Header/><s:Body><s:Fault><s:Code><s:Value>s:Receiver</s:Value></s:Code><s:Reason><s:Text>generic</s:Text></s:Reason><s:Detail><f:WSManFault xmlns:f="http://schemas.microsoft.com/wbem/wsman/1/wsmanfault" Code="5"><f:Message>Access is denied.</f:Message></f:WSManFault></s:Detail></s:Fault></s:Body></s:Envelope>"#,
            SOAP_ENV_NS
        );
        let fault = parse_envelope(xml.as_bytes()).unwrap().fault().unwrap();
        assert_eq!(fault.reason, "Access is denied.");
        assert_eq!(fault.subcode, None);
    }

    #[test]
    fn test_no_fault_on_normal_body() {
        let envelope = build_envelope(&Unaddressed, &RequestHeaders::new("http://h/wsman"));
        assert!(envelope.fault().is_none());
        assert!(envelope.body_contains("Identify"));
    }
}
