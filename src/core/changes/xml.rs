//! Decodes the XML change payload produced by an LLM.
//!
//! ```xml
//! <file>
//!   <file_summary>Add greeting</file_summary>
//!   <file_operation>CREATE</file_operation>
//!   <file_path>src/hello.rs</file_path>
//!   <file_code><![CDATA[
//! pub fn hello() {}
//! ]]></file_code>
//! </file>
//! ```
//!
//! Any wrapping elements are ignored, as is prose or a markdown fence around
//! the XML block.

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{ChangeOperation, ChangeRequest, RejectedChange};
use crate::core::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Summary,
    Operation,
    Path,
    Code,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"file_summary" => Some(Self::Summary),
            b"file_operation" => Some(Self::Operation),
            b"file_path" => Some(Self::Path),
            b"file_code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// Text collected for one field. CDATA sections and plain text are kept
/// apart so that indentation around a CDATA block can be dropped.
#[derive(Debug, Default)]
struct FieldText {
    parts: Vec<(bool, String)>,
}

impl FieldText {
    fn push_text(&mut self, text: String) {
        self.parts.push((false, text));
    }

    fn push_cdata(&mut self, text: String) {
        self.parts.push((true, text));
    }

    fn finish(self) -> String {
        let has_cdata = self.parts.iter().any(|(cdata, _)| *cdata);
        self.parts
            .into_iter()
            .filter(|(cdata, text)| !has_cdata || *cdata || !text.trim().is_empty())
            .map(|(_, text)| text)
            .collect()
    }
}

#[derive(Debug, Default)]
struct RawRecord {
    summary: Option<String>,
    operation: Option<String>,
    path: Option<String>,
    code: Option<String>,
}

impl RawRecord {
    fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Summary => &mut self.summary,
            Field::Operation => &mut self.operation,
            Field::Path => &mut self.path,
            Field::Code => &mut self.code,
        };
        *slot = Some(value);
    }

    fn into_request(self) -> Result<ChangeRequest, RejectedChange> {
        let path = self
            .path
            .map(|p| p.trim().to_string())
            .unwrap_or_default();

        let reject = |error| RejectedChange {
            path: path.clone(),
            error,
        };

        if path.is_empty() {
            return Err(reject(CoreError::MissingField("file_path")));
        }

        let operation = match self.operation.as_deref().map(str::trim) {
            None | Some("") => return Err(reject(CoreError::MissingField("file_operation"))),
            Some(op) => op.parse::<ChangeOperation>().map_err(reject)?,
        };

        let code = self.code.unwrap_or_default();
        let code = code
            .strip_prefix("\r\n")
            .or_else(|| code.strip_prefix('\n'))
            .unwrap_or(&code)
            .to_string();

        Ok(ChangeRequest {
            path,
            operation,
            code,
            summary: self.summary.map(|s| s.trim().to_string()).unwrap_or_default(),
        })
    }
}

/// Decodes every `<file>` element of `payload` into a change record.
///
/// Records with a missing path or operation, or with an unknown operation,
/// come back as `Err` entries in their original position. The whole call fails
/// only when the XML itself is malformed or contains no `<file>` element.
pub fn parse_change_payload(
    payload: &str,
) -> Result<Vec<Result<ChangeRequest, RejectedChange>>, CoreError> {
    let xml = strip_surrounding_text(payload);
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut records = Vec::new();
    let mut current: Option<RawRecord> = None;
    let mut field: Option<(Field, FieldText)> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            CoreError::InvalidPayload(format!("{e} at position {}", reader.error_position()))
        })?;

        match event {
            Event::Start(tag) => {
                let name = tag.name();
                if name.as_ref() == b"file" {
                    if current.is_some() {
                        return Err(CoreError::InvalidPayload(
                            "nested <file> element".to_string(),
                        ));
                    }
                    current = Some(RawRecord::default());
                } else if current.is_some() && field.is_none() {
                    field = Field::from_tag(name.as_ref()).map(|f| (f, FieldText::default()));
                }
            }
            Event::Empty(tag) => {
                let name = tag.name();
                if name.as_ref() == b"file" && current.is_none() {
                    records.push(RawRecord::default().into_request());
                } else if let (Some(record), Some(f)) =
                    (current.as_mut(), Field::from_tag(name.as_ref()))
                {
                    record.set(f, String::new());
                }
            }
            Event::Text(text) => {
                if let Some((_, collected)) = field.as_mut() {
                    let unescaped = text.unescape().map_err(|e| {
                        CoreError::InvalidPayload(format!("invalid text content: {e}"))
                    })?;
                    collected.push_text(unescaped.into_owned());
                }
            }
            Event::CData(data) => {
                if let Some((_, collected)) = field.as_mut() {
                    collected.push_cdata(String::from_utf8_lossy(&data.into_inner()).into_owned());
                }
            }
            Event::End(tag) => {
                let name = tag.name();
                if name.as_ref() == b"file" {
                    if let Some(record) = current.take() {
                        records.push(record.into_request());
                    }
                    field = None;
                } else if let Some((f, _)) = field.as_ref() {
                    if Field::from_tag(name.as_ref()) == Some(*f) {
                        if let (Some((f, collected)), Some(record)) = (field.take(), current.as_mut()) {
                            record.set(f, collected.finish());
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if current.is_some() {
        return Err(CoreError::InvalidPayload("unterminated <file> element".to_string()));
    }
    if records.is_empty() {
        return Err(CoreError::InvalidPayload("no <file> elements found".to_string()));
    }

    tracing::debug!("Decoded {} change records", records.len());
    Ok(records)
}

/// Drops anything before the first `<` and after the last `>`, such as a
/// markdown code fence.
fn strip_surrounding_text(payload: &str) -> &str {
    match (payload.find('<'), payload.rfind('>')) {
        (Some(start), Some(end)) if start < end => &payload[start..=end],
        _ => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"```xml
<code_changes>
    <changed_files>
        <file>
            <file_summary>Add greeting</file_summary>
            <file_operation>CREATE</file_operation>
            <file_path>src/hello.rs</file_path>
            <file_code><![CDATA[
pub fn hello() -> &'static str { "<hi>" }
]]></file_code>
        </file>
        <file>
            <file_summary>Drop old module</file_summary>
            <file_operation>delete</file_operation>
            <file_path> src/old.rs </file_path>
        </file>
    </changed_files>
</code_changes>
```"#;

    #[test]
    fn test_decodes_records_in_order() {
        let records = parse_change_payload(PAYLOAD).unwrap();
        assert_eq!(records.len(), 2);

        let first = records[0].as_ref().unwrap();
        assert_eq!(first.path, "src/hello.rs");
        assert_eq!(first.operation, ChangeOperation::Create);
        assert_eq!(first.summary, "Add greeting");
        assert_eq!(first.code, "pub fn hello() -> &'static str { \"<hi>\" }\n");

        let second = records[1].as_ref().unwrap();
        assert_eq!(second.path, "src/old.rs");
        assert_eq!(second.operation, ChangeOperation::Delete);
        assert_eq!(second.code, "");
    }

    #[test]
    fn test_plain_text_code_is_unescaped() {
        let payload = "<file><file_operation>update</file_operation><file_path>a.txt</file_path>\
                       <file_code>a &lt; b &amp;&amp; c</file_code></file>";
        let records = parse_change_payload(payload).unwrap();
        assert_eq!(records[0].as_ref().unwrap().code, "a < b && c");
    }

    #[test]
    fn test_invalid_records_are_rejected_individually() {
        let payload = "<changes>\
            <file><file_operation>rename</file_operation><file_path>a.txt</file_path></file>\
            <file><file_operation>create</file_operation></file>\
            <file><file_path>c.txt</file_path></file>\
            <file><file_operation>modify</file_operation><file_path>d.txt</file_path></file>\
            </changes>";
        let records = parse_change_payload(payload).unwrap();
        assert_eq!(records.len(), 4);

        let unknown = records[0].as_ref().unwrap_err();
        assert_eq!(unknown.path, "a.txt");
        assert!(matches!(unknown.error, CoreError::UnknownOperation(_)));

        let no_path = records[1].as_ref().unwrap_err();
        assert!(matches!(no_path.error, CoreError::MissingField("file_path")));

        let no_operation = records[2].as_ref().unwrap_err();
        assert!(matches!(no_operation.error, CoreError::MissingField("file_operation")));

        assert_eq!(records[3].as_ref().unwrap().operation, ChangeOperation::Update);
    }

    #[test]
    fn test_malformed_or_empty_payloads_fail_as_a_whole() {
        assert!(matches!(
            parse_change_payload("<file><file_path>a</file>"),
            Err(CoreError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_change_payload("<changes></changes>"),
            Err(CoreError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_change_payload("no xml here"),
            Err(CoreError::InvalidPayload(_))
        ));
        assert!(matches!(
            parse_change_payload("<file><file_path>a</file_path>"),
            Err(CoreError::InvalidPayload(_))
        ));
    }
}
