use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Map, Number, Value};

use super::{OPEN_TAG, STOP_SEQUENCE};
use crate::tool::{ParameterType, ToolDefinition};

#[derive(thiserror::Error, Debug)]
pub enum MarkupError {
    #[error("malformed <function_calls> block: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("failed to unescape XML entity: {0}")]
    Unescape(#[from] quick_xml::escape::EscapeError),

    #[error("invalid UTF-8 sequence: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("unexpected <{found}> inside <{parent}>")]
    UnexpectedElement { found: String, parent: String },

    #[error("unexpected text inside <{0}>")]
    UnexpectedText(String),

    #[error("<invoke> without a <tool_name>")]
    MissingToolName,

    #[error("parameter `{0}` given more than once")]
    DuplicateParameter(String),

    #[error("unterminated <{0}>")]
    Unterminated(String),

    #[error("<function_calls> block without any <invoke>")]
    NoInvocations,

    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error("parameter `{name}` is not a valid {expected}: {value:?}")]
    Coercion {
        name: String,
        expected: &'static str,
        value: String,
    },
}

/// One `<invoke>` block: a tool name and flat name/value parameter pairs,
/// values trimmed but otherwise uncoerced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub tool_name: String,
    pub parameters: Vec<(String, String)>,
}

impl Invocation {
    /// Looks the tool up and coerces every value to its declared type,
    /// returning the JSON-encoded arguments object.
    pub fn to_args_json(&self, tools: &[ToolDefinition]) -> Result<String, MarkupError> {
        let tool = tools
            .iter()
            .find(|tool| tool.name == self.tool_name)
            .ok_or_else(|| MarkupError::UnknownTool(self.tool_name.clone()))?;

        let mut args = Map::new();
        for (name, value) in &self.parameters {
            let ty = tool.parameter_type(name).unwrap_or_default();
            args.insert(name.clone(), coerce(name, value, ty)?);
        }

        Ok(Value::Object(args).to_string())
    }
}

#[derive(Debug, Default)]
struct Draft {
    tool_name: Option<String>,
    parameters: Vec<(String, String)>,
}

/// Walks the element tree, tracking the open-element path.
#[derive(Debug, Default)]
struct BlockParser {
    path: Vec<String>,
    current: Option<Draft>,
    value: String,
    invocations: Vec<Invocation>,
}

impl BlockParser {
    fn open(&mut self, name: &str) -> Result<(), MarkupError> {
        let allowed = match self.path.as_slice() {
            [] => name == "function_calls",
            [_] => name == "invoke",
            [_, _] => name == "tool_name" || name == "parameters",
            [_, _, parent] => parent == "parameters",
            _ => false,
        };
        if !allowed {
            return Err(MarkupError::UnexpectedElement {
                found: name.to_string(),
                parent: self.path.last().cloned().unwrap_or_default(),
            });
        }

        if name == "invoke" {
            self.current = Some(Draft::default());
        }
        self.value.clear();
        self.path.push(name.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), MarkupError> {
        let depth = self.path.len();
        let Some(name) = self.path.pop() else {
            return Ok(());
        };

        match (depth, name.as_str()) {
            (3, "tool_name") => {
                let tool_name = std::mem::take(&mut self.value).trim().to_string();
                if let Some(draft) = self.current.as_mut() {
                    draft.tool_name = Some(tool_name);
                }
            }
            (4, _) => {
                let value = std::mem::take(&mut self.value).trim().to_string();
                if let Some(draft) = self.current.as_mut() {
                    if draft.parameters.iter().any(|(existing, _)| *existing == name) {
                        return Err(MarkupError::DuplicateParameter(name));
                    }
                    draft.parameters.push((name, value));
                }
            }
            (2, "invoke") => {
                let draft = self.current.take().unwrap_or_default();
                let tool_name = draft
                    .tool_name
                    .filter(|tool_name| !tool_name.is_empty())
                    .ok_or(MarkupError::MissingToolName)?;
                self.invocations.push(Invocation {
                    tool_name,
                    parameters: draft.parameters,
                });
            }
            _ => {}
        }

        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), MarkupError> {
        let takes_text = matches!(
            self.path.as_slice(),
            [_, _, tag] if tag == "tool_name"
        ) || matches!(self.path.as_slice(), [_, _, _, _]);

        if takes_text {
            self.value.push_str(text);
            Ok(())
        } else if text.trim().is_empty() {
            Ok(())
        } else {
            Err(MarkupError::UnexpectedText(
                self.path.last().cloned().unwrap_or_default(),
            ))
        }
    }

    fn finish(self) -> Result<Vec<Invocation>, MarkupError> {
        if let Some(open) = self.path.last() {
            return Err(MarkupError::Unterminated(open.clone()));
        }
        if self.invocations.is_empty() {
            return Err(MarkupError::NoInvocations);
        }
        Ok(self.invocations)
    }
}

/// Parses the body of one `<function_calls>` block (the text between the
/// opening tag and the closing stop sequence).
///
/// Parameter values are plain text: a bare `&` or `<` inside a value is kept
/// as written. Only the structural tags are checked strictly.
pub fn parse_block(body: &str) -> Result<Vec<Invocation>, MarkupError> {
    let document = format!("{OPEN_TAG}{}{STOP_SEQUENCE}", shield_values(body));
    let mut reader = Reader::from_str(&document);
    let mut parser = BlockParser::default();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                parser.open(std::str::from_utf8(start.name().as_ref())?)?;
            }
            Event::Empty(start) => {
                parser.open(std::str::from_utf8(start.name().as_ref())?)?;
                parser.close()?;
            }
            Event::End(_) => parser.close()?,
            Event::Text(text) => {
                let raw = std::str::from_utf8(&text)?;
                parser.text(&quick_xml::escape::unescape(raw)?)?;
            }
            Event::GeneralRef(reference) => {
                let entity = format!("&{};", std::str::from_utf8(&reference)?);
                parser.text(&quick_xml::escape::unescape(&entity)?)?;
            }
            Event::CData(data) => parser.text(std::str::from_utf8(&data)?)?,
            Event::Eof => break,
            _ => {}
        }
    }

    parser.finish()
}

/// Wraps every parameter value that would not survive an XML reader in a
/// CDATA section. Values that are already valid XML text (plain text,
/// entity references, a single CDATA section) pass through untouched so
/// their references still resolve.
fn shield_values(body: &str) -> String {
    const PARAMETERS: &str = "<parameters>";

    let mut document = String::with_capacity(body.len());
    let mut rest = body;

    while let Some((before, after)) = rest.split_once(PARAMETERS) {
        document.push_str(before);
        document.push_str(PARAMETERS);
        rest = after;

        loop {
            let trimmed = rest.trim_start();
            let (whitespace, tail) = rest.split_at(rest.len() - trimmed.len());
            document.push_str(whitespace);
            rest = tail;

            // anything but `<name>value</name>` is left to the reader
            let Some((name, remainder)) = rest
                .strip_prefix('<')
                .and_then(|element| element.split_once('>'))
                .filter(|(name, _)| is_element_name(name))
            else {
                break;
            };
            let closing = format!("</{name}>");
            let Some((value, remainder)) = remainder.split_once(closing.as_str()) else {
                break;
            };

            document.push('<');
            document.push_str(name);
            document.push('>');
            if is_xml_text(value) {
                document.push_str(value);
            } else {
                document.push_str("<![CDATA[");
                document.push_str(&value.replace("]]>", "]]]]><![CDATA[>"));
                document.push_str("]]>");
            }
            document.push_str(&closing);
            rest = remainder;
        }
    }

    document.push_str(rest);
    document
}

fn is_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
}

fn is_xml_text(value: &str) -> bool {
    if let Some(inner) = value
        .trim()
        .strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
    {
        return !inner.contains("]]>");
    }

    !value.contains('<')
        && value
            .match_indices('&')
            .all(|(at, _)| value.get(at + 1..).is_some_and(starts_with_reference))
}

/// Whether `text` (just past an `&`) begins a character or predefined entity
/// reference.
fn starts_with_reference(text: &str) -> bool {
    let Some((name, _)) = text.split_once(';') else {
        return false;
    };

    match name.strip_prefix('#') {
        Some(code) => match code.strip_prefix('x') {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()),
        },
        None => matches!(name, "amp" | "lt" | "gt" | "quot" | "apos"),
    }
}

fn coerce(name: &str, value: &str, ty: ParameterType) -> Result<Value, MarkupError> {
    let invalid = || MarkupError::Coercion {
        name: name.to_string(),
        expected: ty.as_str(),
        value: value.to_string(),
    };

    match ty {
        ParameterType::String => Ok(Value::String(value.to_string())),
        ParameterType::Integer => {
            if let Ok(n) = value.parse::<i64>() {
                Ok(Value::from(n))
            } else if let Ok(n) = value.parse::<u64>() {
                Ok(Value::from(n))
            } else {
                Err(invalid())
            }
        }
        ParameterType::Number => {
            if let Ok(n) = value.parse::<i64>() {
                return Ok(Value::from(n));
            }
            value
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(invalid)
        }
        ParameterType::Boolean => {
            if value.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if value.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(invalid())
            }
        }
        ParameterType::Array => match serde_json::from_str::<Value>(value) {
            Ok(array @ Value::Array(_)) => Ok(array),
            _ => Err(invalid()),
        },
        ParameterType::Object => match serde_json::from_str::<Value>(value) {
            Ok(object @ Value::Object(_)) => Ok(object),
            _ => Err(invalid()),
        },
        ParameterType::Null => {
            if value.is_empty() || value == "null" {
                Ok(Value::Null)
            } else {
                Err(invalid())
            }
        }
    }
}
