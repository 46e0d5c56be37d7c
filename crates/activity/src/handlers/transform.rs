//! `transform` activity: `json2csv`, `xml2json`, `json2xml`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use flowmesh_context::ExecutionContext;
use flowmesh_error::FlowError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde_json::{json, Map, Value};

use crate::{ActivityHandler, ActivityInput};

#[derive(Default)]
pub struct TransformHandler;

fn source_value(input: &ActivityInput, config: &Value) -> Value {
    input
        .get("data")
        .or_else(|| config.get("data"))
        .cloned()
        .unwrap_or(Value::Null)
}

fn source_string(input: &ActivityInput, config: &Value) -> String {
    input
        .get("data")
        .and_then(Value::as_str)
        .or_else(|| config.get("data").and_then(Value::as_str))
        .unwrap_or_default()
        .to_owned()
}

/// `rows` must be an array of flat objects. Column order is the
/// sorted union of every row's keys, so output is deterministic
/// regardless of row-to-row key ordering.
fn json_to_csv(value: &Value) -> Result<String, FlowError> {
    let rows = value
        .as_array()
        .ok_or_else(|| FlowError::activity("json2csv input must be a JSON array of objects"))?;

    let mut columns: BTreeMap<String, ()> = BTreeMap::new();
    for row in rows {
        if let Some(obj) = row.as_object() {
            for key in obj.keys() {
                columns.insert(key.clone(), ());
            }
        }
    }
    let headers: Vec<String> = columns.into_keys().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&headers)
        .map_err(|e| FlowError::activity(format!("csv write failed: {e}")))?;
    for row in rows {
        let record: Vec<String> = headers
            .iter()
            .map(|h| {
                row.get(h).map_or_else(String::new, |v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| FlowError::activity(format!("csv write failed: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| FlowError::activity(format!("csv flush failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| FlowError::activity(format!("csv output not UTF-8: {e}")))
}

/// Builds a JSON value from a parsed XML subtree. Repeated child
/// element names are grouped into arrays; a leaf element with only
/// text content becomes a string.
fn xml_to_json(xml: &str) -> Result<Value, FlowError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<(String, Map<String, Value>)> = vec![(String::new(), Map::new())];
    let mut text_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = element_name(&start);
                stack.push((name, Map::new()));
                text_buf.clear();
            }
            Ok(Event::Empty(start)) => {
                let name = element_name(&start);
                insert_child(&mut stack, name, Value::String(String::new()));
            }
            Ok(Event::Text(text)) => {
                text_buf.push_str(
                    &text
                        .unescape()
                        .map_err(|e| FlowError::activity(format!("xml2json decode failed: {e}")))?,
                );
            }
            Ok(Event::End(_)) => {
                let (name, children) = stack.pop().ok_or_else(|| FlowError::activity("xml2json: unbalanced tags"))?;
                let value = if children.is_empty() {
                    Value::String(std::mem::take(&mut text_buf))
                } else {
                    Value::Object(children)
                };
                insert_child(&mut stack, name, value);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(FlowError::activity(format!("xml2json parse failed: {e}"))),
        }
    }

    Ok(Value::Object(stack.pop().map(|(_, m)| m).unwrap_or_default()))
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
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

fn json_to_xml(value: &Value) -> Result<String, FlowError> {
    let object = value
        .as_object()
        .ok_or_else(|| FlowError::activity("json2xml input must be a JSON object"))?;

    let mut writer = Writer::new(Vec::new());
    write_xml_object(&mut writer, "root", value).map_err(|e| FlowError::activity(format!("json2xml failed: {e}")))?;
    let _ = object;
    String::from_utf8(writer.into_inner()).map_err(|e| FlowError::activity(format!("xml output not UTF-8: {e}")))
}

fn write_xml_object(writer: &mut Writer<Vec<u8>>, tag: &str, value: &Value) -> quick_xml::Result<()> {
    match value {
        Value::Object(map) => {
            writer.write_event(Event::Start(BytesStart::new(tag)))?;
            for (key, child) in map {
                write_xml_object(writer, key, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
        Value::Array(items) => {
            for item in items {
                write_xml_object(writer, tag, item)?;
            }
        }
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(tag)))?;
        }
        other => {
            writer.write_event(Event::Start(BytesStart::new(tag)))?;
            let text = match other {
                Value::String(s) => s.clone(),
                _ => other.to_string(),
            };
            writer.write_event(Event::Text(BytesText::new(&text)))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }
    }
    Ok(())
}

#[async_trait]
impl ActivityHandler for TransformHandler {
    fn activity_type(&self) -> &'static str {
        "transform"
    }

    async fn execute(
        &self,
        input: &ActivityInput,
        config: &Value,
        _ctx: &ExecutionContext,
    ) -> Result<Value, FlowError> {
        let transform_type = config
            .get("transform_type")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::config("transform node requires `transform_type`"))?;

        let result = match transform_type {
            "json2csv" => json_to_csv(&source_value(input, config))?,
            "xml2json" => return Ok(json!({ "result": xml_to_json(&source_string(input, config))?.to_string() })),
            "json2xml" => json_to_xml(&source_value(input, config))?,
            other => {
                return Err(FlowError::config(format!(
                    "unsupported transform_type `{other}`"
                )))
            }
        };

        Ok(json!({ "result": result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowmesh_core::{ExecutionId, ProcessId};

    fn ctx() -> ExecutionContext {
        ExecutionContext::new(ExecutionId::new(), ProcessId::new("p"), json!({}))
    }

    #[tokio::test]
    async fn json2csv_header_order_is_sorted() {
        let handler = TransformHandler;
        let config = json!({
            "transform_type": "json2csv",
            "data": [{"b": 1, "a": 2}],
        });
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        let csv_text = output["result"].as_str().unwrap();
        assert!(csv_text.starts_with("a,b"));
    }

    #[tokio::test]
    async fn xml2json_groups_repeated_elements_into_arrays() {
        let handler = TransformHandler;
        let config = json!({
            "transform_type": "xml2json",
            "data": "<root><item>1</item><item>2</item></root>",
        });
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        let parsed: Value = serde_json::from_str(output["result"].as_str().unwrap()).unwrap();
        assert_eq!(parsed["root"]["item"], json!(["1", "2"]));
    }

    #[tokio::test]
    async fn json2xml_round_trips_through_xml2json() {
        let handler = TransformHandler;
        let config = json!({"transform_type": "json2xml", "data": {"name": "ada"}});
        let output = handler.execute(&ActivityInput::new(), &config, &ctx()).await.unwrap();
        assert!(output["result"].as_str().unwrap().contains("<name>ada</name>"));
    }

    #[tokio::test]
    async fn unsupported_transform_type_is_a_config_error() {
        let handler = TransformHandler;
        let config = json!({"transform_type": "yaml2json"});
        assert!(handler.execute(&ActivityInput::new(), &config, &ctx()).await.is_err());
    }
}
