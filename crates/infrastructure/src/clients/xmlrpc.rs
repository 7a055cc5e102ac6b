//! Minimal XML-RPC codec for the rTorrent wire protocol.
//!
//! Covers exactly the value types rTorrent exchanges: integers (`i4`/`i8`),
//! strings, base64 blobs, and arrays. Faults are surfaced as
//! `DomainError::BackendFailure`.

use base64::Engine;

use domain::DomainError;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    String(String),
    Base64(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::String(value) => value.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}

pub fn write_request(method: &str, params: &[Value]) -> String {
    let mut xml = String::with_capacity(256);
    xml.push_str(r#"<?xml version="1.0"?>"#);
    xml.push_str("<methodCall><methodName>");
    xml.push_str(&escape(method));
    xml.push_str("</methodName><params>");
    for param in params {
        xml.push_str("<param>");
        write_value(&mut xml, param);
        xml.push_str("</param>");
    }
    xml.push_str("</params></methodCall>");
    xml
}

fn write_value(xml: &mut String, value: &Value) {
    xml.push_str("<value>");
    match value {
        Value::Int(v) => {
            xml.push_str("<i8>");
            xml.push_str(&v.to_string());
            xml.push_str("</i8>");
        }
        Value::String(v) => {
            xml.push_str("<string>");
            xml.push_str(&escape(v));
            xml.push_str("</string>");
        }
        Value::Base64(bytes) => {
            xml.push_str("<base64>");
            xml.push_str(&base64::engine::general_purpose::STANDARD.encode(bytes));
            xml.push_str("</base64>");
        }
        Value::Array(values) => {
            xml.push_str("<array><data>");
            for inner in values {
                write_value(xml, inner);
            }
            xml.push_str("</data></array>");
        }
    }
    xml.push_str("</value>");
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Parse a `methodResponse`, returning the single result value or the fault
/// as an error.
pub fn parse_response(xml: &str) -> Result<Value, DomainError> {
    let node = parse_element(xml, &mut position_after_prolog(xml))
        .ok_or_else(|| DomainError::BackendFailure("Malformed XML-RPC response".to_string()))?;
    if node.tag != "methodResponse" {
        return Err(DomainError::BackendFailure(format!(
            "Unexpected XML-RPC root element: {}",
            node.tag
        )));
    }
    if let Some(fault) = node.child("fault") {
        let message = fault
            .child("value")
            .map(describe_fault)
            .unwrap_or_else(|| "unknown fault".to_string());
        return Err(DomainError::BackendFailure(format!(
            "XML-RPC fault: {message}"
        )));
    }
    let value = node
        .child("params")
        .and_then(|params| params.child("param"))
        .and_then(|param| param.child("value"))
        .ok_or_else(|| DomainError::BackendFailure("XML-RPC response without value".to_string()))?;
    decode_value(value)
}

fn describe_fault(value: &XmlNode) -> String {
    // Fault payloads are structs; flatten their members into one line.
    let mut parts = Vec::new();
    collect_text(value, &mut parts);
    parts.join(" ")
}

fn collect_text(node: &XmlNode, out: &mut Vec<String>) {
    let text = node.text.trim();
    if !text.is_empty() {
        out.push(unescape(text));
    }
    for child in &node.children {
        collect_text(child, out);
    }
}

fn decode_value(node: &XmlNode) -> Result<Value, DomainError> {
    let inner = match node.children.first() {
        Some(child) => child,
        // A bare <value>text</value> carries a string.
        None => return Ok(Value::String(unescape(node.text.trim()))),
    };
    match inner.tag.as_str() {
        "i4" | "i8" | "int" => inner
            .text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| DomainError::BackendFailure(format!("Bad XML-RPC int: {}", inner.text))),
        "boolean" => Ok(Value::Int(if inner.text.trim() == "1" { 1 } else { 0 })),
        "string" => Ok(Value::String(unescape(&inner.text))),
        "base64" => {
            let cleaned: String = inner.text.split_whitespace().collect();
            base64::engine::general_purpose::STANDARD
                .decode(cleaned)
                .map(Value::Base64)
                .map_err(|e| DomainError::BackendFailure(format!("Bad XML-RPC base64: {e}")))
        }
        "array" => {
            let mut values = Vec::new();
            if let Some(data) = inner.child("data") {
                for child in data.children_by_tag("value") {
                    values.push(decode_value(child)?);
                }
            }
            Ok(Value::Array(values))
        }
        other => Err(DomainError::BackendFailure(format!(
            "Unsupported XML-RPC type: {other}"
        ))),
    }
}

// Cursor-based element parser; rTorrent responses are small and flat enough
// that a full XML library buys nothing here.

struct XmlNode {
    tag: String,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn child(&self, tag: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.tag == tag)
    }

    fn children_by_tag(&self, tag: &str) -> Vec<&XmlNode> {
        self.children.iter().filter(|c| c.tag == tag).collect()
    }
}

fn position_after_prolog(text: &str) -> usize {
    let mut pos = 0;
    loop {
        skip_whitespace(text, &mut pos);
        if text[pos..].starts_with("<?") {
            if let Some(end) = text[pos..].find("?>") {
                pos += end + 2;
                continue;
            }
        }
        if text[pos..].starts_with("<!--") {
            if let Some(end) = text[pos..].find("-->") {
                pos += end + 3;
                continue;
            }
        }
        break;
    }
    pos
}

fn skip_whitespace(text: &str, pos: &mut usize) {
    while *pos < text.len() && text.as_bytes()[*pos].is_ascii_whitespace() {
        *pos += 1;
    }
}

fn parse_element(text: &str, pos: &mut usize) -> Option<XmlNode> {
    skip_whitespace(text, pos);
    if !text[*pos..].starts_with('<') {
        return None;
    }
    let open_end = text[*pos..].find('>')? + *pos;
    let raw_tag = &text[*pos + 1..open_end];
    let self_closing = raw_tag.ends_with('/');
    let tag = raw_tag
        .trim_end_matches('/')
        .split_whitespace()
        .next()?
        .to_string();
    *pos = open_end + 1;

    let mut node = XmlNode {
        tag,
        text: String::new(),
        children: Vec::new(),
    };
    if self_closing {
        return Some(node);
    }

    let closing = format!("</{}>", node.tag);
    loop {
        if *pos >= text.len() {
            return None;
        }
        if text[*pos..].starts_with(&closing) {
            *pos += closing.len();
            return Some(node);
        }
        if text[*pos..].starts_with('<') {
            node.children.push(parse_element(text, pos)?);
        } else {
            let next = text[*pos..].find('<')? + *pos;
            node.text.push_str(&text[*pos..next]);
            *pos = next;
        }
    }
}
