//! Minimal SOAP 1.1/1.2 envelope parsing and Fault rendering for the
//! soap trigger. Namespace-prefix tolerant (`soap:`, `soapenv:`,
//! `env:`, or none) — it matches on local name only.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};

use flowmesh_error::FlowError;

fn local_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn xml_fragment_to_json(xml: &str) -> Result<Value, FlowError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<(String, Map<String, Value>)> = vec![(String::new(), Map::new())];
    let mut text_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                stack.push((element_name(&start), Map::new()));
                text_buf.clear();
            }
            Ok(Event::Empty(start)) => {
                insert_child(&mut stack, element_name(&start), Value::String(String::new()));
            }
            Ok(Event::Text(text)) => {
                text_buf.push_str(
                    &text
                        .unescape()
                        .map_err(|e| FlowError::config(format!("soap envelope decode failed: {e}")))?,
                );
            }
            Ok(Event::End(_)) => {
                let (name, children) = stack.pop().ok_or_else(|| FlowError::config("soap envelope: unbalanced tags"))?;
                let value = if children.is_empty() {
                    Value::String(std::mem::take(&mut text_buf))
                } else {
                    Value::Object(children)
                };
                insert_child(&mut stack, name, value);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FlowError::config(format!("soap envelope parse failed: {e}"))),
        }
    }

    Ok(Value::Object(stack.pop().map(|(_, m)| m).unwrap_or_default()))
}

fn insert_child(stack: &mut [(String, Map<String, Value>)], name: String, value: Value) {
    if let Some((_, parent)) = stack.last_mut() {
        match parent.get_mut(&name) {
            Some(Value::Array(arr)) => arr.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                parent.insert(name, value);
            }
        }
    }
}

fn find_local<'a>(object: &'a Map<String, Value>, target: &str) -> Option<(&'a String, &'a Value)> {
    object.iter().find(|(key, _)| local_name(key).eq_ignore_ascii_case(target))
}

/// Validate that `xml` is a well-formed SOAP envelope carrying a
/// `<Body>`, then return that body's raw inner XML text verbatim —
/// the trigger forwards it unparsed as `trigger_data.body`.
pub fn body_inner_xml(xml: &str) -> Result<String, FlowError> {
    let root = xml_fragment_to_json(xml)?;
    let root_obj = root.as_object().ok_or_else(|| FlowError::config("soap envelope is not an XML document"))?;
    find_local(root_obj, "Envelope").ok_or_else(|| FlowError::config("soap envelope missing <Envelope>"))?;

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut body_depth: Option<usize> = None;
    let mut depth = 0usize;
    let mut start_pos = 0usize;

    loop {
        let pos_before = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                depth += 1;
                if body_depth.is_none() && local_name(&element_name(&start)) == "Body" {
                    body_depth = Some(depth);
                    start_pos = reader.buffer_position();
                }
            }
            Ok(Event::Empty(start)) => {
                if body_depth.is_none() && local_name(&element_name(&start)) == "Body" {
                    return Ok(String::new());
                }
            }
            Ok(Event::End(_)) => {
                if body_depth == Some(depth) {
                    return Ok(xml[start_pos..pos_before].to_owned());
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FlowError::config(format!("soap envelope parse failed: {e}"))),
        }
    }

    Err(FlowError::config("soap envelope missing <Body>"))
}

/// Render a SOAP 1.1 Fault envelope carrying `message` in `faultstring`.
#[must_use]
pub fn fault_xml(message: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
<soap:Body><soap:Fault><faultcode>soap:Server</faultcode>\
<faultstring>{}</faultstring></soap:Fault></soap:Body></soap:Envelope>",
        escape(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_raw_body_inner_xml_with_namespace_prefixes() {
        let xml = r#"<?xml version="1.0"?>
            <soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
                <soapenv:Body>
                    <GetQuote><symbol>ACME</symbol></GetQuote>
                </soapenv:Body>
            </soapenv:Envelope>"#;
        let body = body_inner_xml(xml).unwrap();
        assert!(body.contains("<GetQuote><symbol>ACME</symbol></GetQuote>"));
    }

    #[test]
    fn extracts_raw_body_inner_xml_without_prefixes() {
        let xml = "<Envelope><Body><Ping/></Body></Envelope>";
        let body = body_inner_xml(xml).unwrap();
        assert_eq!(body, "<Ping/>");
    }

    #[test]
    fn rejects_missing_body() {
        let xml = "<Envelope></Envelope>";
        assert!(body_inner_xml(xml).is_err());
    }

    #[test]
    fn rejects_missing_envelope() {
        assert!(body_inner_xml("<NotSoap/>").is_err());
    }

    #[test]
    fn fault_xml_escapes_the_message() {
        let rendered = fault_xml("bad <input>");
        assert!(rendered.contains("bad &lt;input&gt;"));
    }

    #[test]
    fn fault_envelope_matches_known_shape() {
        insta::assert_snapshot!(fault_xml("no soap trigger mounted at /quote"), @r###"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>no soap trigger mounted at /quote</faultstring></soap:Fault></soap:Body></soap:Envelope>"###);
    }
}
