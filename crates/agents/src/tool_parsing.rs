//! Recover tool calls that a model wrote into its text output.
//!
//! Models without reliable native tool calling often answer with a JSON
//! object, a fenced block, or something JSON-ish in the middle of prose.
//! [`ExtractorChain`] runs an ordered list of [`ToolCallExtractor`] stages
//! over the text and returns the first hit:
//!
//! 1. the whole text is a JSON object with an invocation field
//! 2. a fenced code block holding such an object
//! 3. a bracket-balanced JSON object anywhere in the text
//! 4. a lenient `name`/`arguments` pattern (single quotes, bare keys)
//! 5. a quoted `"name"` value equal to a registered tool
//! 6. `<function=name><parameter=k>v</parameter></function>` tags

use std::{fmt::Write, sync::LazyLock};

use {
    regex::Regex,
    serde_json::{Value, json},
};

use crate::model::ToolCall;

/// Keep synthetic tool-call IDs OpenAI-compatible (`maxLength: 40`).
const SYNTHETIC_TOOL_CALL_ID_MAX_LEN: usize = 40;

/// Keys that carry the argument object of an invocation.
const ARGUMENT_KEYS: &[&str] = &["arguments", "args", "parameters", "input"];

pub fn new_synthetic_tool_call_id(prefix: &str) -> String {
    let mut id = String::new();
    let _ = write!(&mut id, "{prefix}_{}", uuid::Uuid::new_v4().simple());
    id.truncate(SYNTHETIC_TOOL_CALL_ID_MAX_LEN);
    id
}

/// A tool call recovered from text, plus whatever prose surrounded it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedCall {
    pub call: ToolCall,
    pub remaining_text: Option<String>,
}

impl ExtractedCall {
    fn new(name: String, arguments: Value, remaining_text: Option<String>) -> Self {
        Self {
            call: ToolCall {
                id: new_synthetic_tool_call_id("text"),
                name,
                arguments,
            },
            remaining_text,
        }
    }
}

/// One recovery stage.
pub trait ToolCallExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// `known_tools` holds the registered tool names, sorted.
    fn extract(&self, text: &str, known_tools: &[String]) -> Option<ExtractedCall>;
}

/// Ordered list of extraction stages; the first stage that succeeds wins.
pub struct ExtractorChain {
    stages: Vec<Box<dyn ToolCallExtractor>>,
}

impl Default for ExtractorChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtractorChain {
    /// The built-in stages, in order.
    pub fn standard() -> Self {
        Self {
            stages: vec![
                Box::new(StructuredField),
                Box::new(FencedBlock),
                Box::new(BalancedJson),
                Box::new(NameArgsPattern),
                Box::new(KnownToolName),
                Box::new(FunctionTag),
            ],
        }
    }

    /// Append a stage after the existing ones.
    #[must_use]
    pub fn with_stage(mut self, stage: Box<dyn ToolCallExtractor>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Returns the winning stage name with its result.
    pub fn extract(
        &self,
        text: &str,
        known_tools: &[String],
    ) -> Option<(&'static str, ExtractedCall)> {
        if text.trim().is_empty() {
            return None;
        }
        self.stages
            .iter()
            .find_map(|stage| stage.extract(text, known_tools).map(|c| (stage.name(), c)))
    }
}

// ── Stages ──────────────────────────────────────────────────────────────────

/// The whole text is one JSON object carrying an invocation.
pub struct StructuredField;

impl ToolCallExtractor for StructuredField {
    fn name(&self) -> &'static str {
        "structured_field"
    }

    fn extract(&self, text: &str, _known_tools: &[String]) -> Option<ExtractedCall> {
        let value: Value = serde_json::from_str(text.trim()).ok()?;
        let (name, arguments) = invocation_from_value(&value)?;
        Some(ExtractedCall::new(name, arguments, None))
    }
}

/// A fenced block (```` ```tool_call ````, ```` ```json ````, or untagged)
/// whose body is an invocation object.
pub struct FencedBlock;

impl ToolCallExtractor for FencedBlock {
    fn name(&self) -> &'static str {
        "fenced_block"
    }

    fn extract(&self, text: &str, _known_tools: &[String]) -> Option<ExtractedCall> {
        let mut search_from = 0;
        while let Some(rel) = text[search_from..].find("```") {
            let open = search_from + rel;
            let after_fence = open + 3;
            let tag_len = text[after_fence..]
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-')
                .count();
            let body_start = after_fence + tag_len;
            let close_rel = text[body_start..].find("```")?;
            let body_end = body_start + close_rel;
            let block_end = body_end + 3;

            if let Ok(value) = serde_json::from_str::<Value>(text[body_start..body_end].trim())
                && let Some((name, arguments)) = invocation_from_value(&value)
            {
                let remaining =
                    compose_remaining_text(text[..open].trim(), text[block_end..].trim());
                return Some(ExtractedCall::new(name, arguments, remaining));
            }
            search_from = block_end;
        }
        None
    }
}

/// The first bracket-balanced JSON object in the text that carries an
/// invocation. Braces inside string literals are ignored.
pub struct BalancedJson;

impl ToolCallExtractor for BalancedJson {
    fn name(&self) -> &'static str {
        "balanced_json"
    }

    fn extract(&self, text: &str, _known_tools: &[String]) -> Option<ExtractedCall> {
        let mut budget = parse_budget(text);
        for span in object_spans(text) {
            budget = budget.checked_sub(span.end - span.start)?;
            if let Ok(value) = serde_json::from_str::<Value>(&text[span.start..span.end])
                && let Some((name, arguments)) = invocation_from_value(&value)
            {
                let remaining =
                    compose_remaining_text(text[..span.start].trim(), text[span.end..].trim());
                return Some(ExtractedCall::new(name, arguments, remaining));
            }
        }
        None
    }
}

/// `tool: 'name', args: {key: 'value'}` and similar near-JSON. Needs both a
/// name and an argument object.
pub struct NameArgsPattern;

impl ToolCallExtractor for NameArgsPattern {
    fn name(&self) -> &'static str {
        "name_args_pattern"
    }

    fn extract(&self, text: &str, _known_tools: &[String]) -> Option<ExtractedCall> {
        let caps = NAME_RE.captures(text)?;
        let whole = caps.get(0)?;
        let name = caps.get(1)?.as_str();
        if !is_valid_tool_name(name) {
            return None;
        }
        let (args_start, args_end, arguments) = locate_arguments(text, 0)?;
        let span = (whole.start().min(args_start), whole.end().max(args_end));
        Some(ExtractedCall::new(
            name.to_string(),
            arguments,
            remaining_around(text, span),
        ))
    }
}

/// A quoted `"name"` value that matches a registered tool.
pub struct KnownToolName;

impl ToolCallExtractor for KnownToolName {
    fn name(&self) -> &'static str {
        "known_tool_name"
    }

    fn extract(&self, text: &str, known_tools: &[String]) -> Option<ExtractedCall> {
        QUOTED_NAME_RE.captures_iter(text).find_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().trim();
            if known_tools.binary_search_by(|t| t.as_str().cmp(name)).is_err() {
                return None;
            }
            let (span, arguments) = match locate_arguments(text, whole.end()) {
                Some((_, end, args)) => ((whole.start(), end), args),
                None => ((whole.start(), whole.end()), json!({})),
            };
            Some(ExtractedCall::new(
                name.to_string(),
                arguments,
                remaining_around(text, span),
            ))
        })
    }
}

/// `<function=name><parameter=key>value</parameter></function>`, optionally
/// wrapped in `<tool_call>` tags.
pub struct FunctionTag;

impl ToolCallExtractor for FunctionTag {
    fn name(&self) -> &'static str {
        "function_tag"
    }

    fn extract(&self, text: &str, _known_tools: &[String]) -> Option<ExtractedCall> {
        const OPEN: &str = "<function=";
        const CLOSE: &str = "</function>";

        let start = text.find(OPEN)?;
        let after_open = start + OPEN.len();
        let name_end = after_open + text[after_open..].find('>')?;
        let name = text[after_open..name_end].trim();
        if !is_valid_tool_name(name) {
            return None;
        }

        let body_start = name_end + 1;
        let body_end = body_start + text[body_start..].find(CLOSE)?;
        let arguments = parse_parameter_tags(&text[body_start..body_end])?;

        let before = trim_tool_call_wrappers(&text[..start]);
        let after = trim_tool_call_wrappers(&text[body_end + CLOSE.len()..]);
        Some(ExtractedCall::new(
            name.to_string(),
            Value::Object(arguments),
            compose_remaining_text(before, after),
        ))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

#[allow(clippy::expect_used)]
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"(?i)["']?\b(?:tool_name|tool|name|function)["']?\s*[:=]\s*["']([A-Za-z0-9_.\-]+)["']"#)
});

static ARGS_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r#"(?i)["']?\b(?:arguments|args|parameters|params|input)["']?\s*[:=]\s*"#)
});

static QUOTED_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r#""name"\s*:\s*"([^"]+)""#));

static BARE_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"));

/// Pull `(name, arguments)` out of a JSON value shaped like any of the
/// common invocation encodings.
fn invocation_from_value(value: &Value) -> Option<(String, Value)> {
    let obj = value.as_object()?;

    for key in ["tool_call", "function_call"] {
        if let Some(found) = obj.get(key).and_then(invocation_from_value) {
            return Some(found);
        }
    }
    if let Some(found) = obj
        .get("tool_calls")
        .and_then(Value::as_array)
        .and_then(|calls| calls.first())
        .and_then(invocation_from_value)
    {
        return Some(found);
    }
    match obj.get("function") {
        Some(inner) if inner.is_object() => {
            if let Some(found) = invocation_from_value(inner) {
                return Some(found);
            }
        },
        Some(Value::String(name)) => {
            return named(name, arguments_of(obj).unwrap_or_else(|| json!({})));
        },
        _ => {},
    }
    if let Some(name) = obj.get("tool").and_then(Value::as_str) {
        return named(name, arguments_of(obj).unwrap_or_else(|| json!({})));
    }
    // A bare `name` is too common in ordinary JSON to count on its own.
    let name = obj.get("name").and_then(Value::as_str)?;
    named(name, arguments_of(obj)?)
}

fn named(name: &str, arguments: Value) -> Option<(String, Value)> {
    let name = name.trim();
    is_valid_tool_name(name).then(|| (name.to_string(), arguments))
}

fn arguments_of(obj: &serde_json::Map<String, Value>) -> Option<Value> {
    ARGUMENT_KEYS
        .iter()
        .find_map(|k| obj.get(*k))
        .map(normalize_arguments)
}

/// Arguments sometimes arrive as a JSON-encoded string.
fn normalize_arguments(value: &Value) -> Value {
    match value {
        Value::String(raw) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| json!({ "input": raw })),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Candidate bytes handed to the JSON parser per stage, as a multiple of the
/// text length. Deeply nested input stops early instead of going quadratic.
const PARSE_BUDGET_FACTOR: usize = 4;

fn parse_budget(text: &str) -> usize {
    text.len().saturating_mul(PARSE_BUDGET_FACTOR)
}

/// A closed `{...}` region: byte offset of the `{` and one past its `}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ObjectSpan {
    start: usize,
    end: usize,
}

/// Every closed object in the text, ordered by its opening brace, found in
/// one pass. Single- and double-quoted strings inside an object are skipped,
/// honoring backslash escapes. Stray `}` and never-closed `{` are ignored.
fn object_spans(text: &str) -> Vec<ObjectSpan> {
    let mut open: Vec<usize> = Vec::new();
    let mut spans = Vec::new();
    let mut quote: Option<u8> = None;
    let mut escaped = false;
    for (i, &b) in text.as_bytes().iter().enumerate() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'"' | b'\'' if !open.is_empty() => quote = Some(b),
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push(ObjectSpan { start, end: i + 1 });
                }
            },
            _ => {},
        }
    }
    spans.sort_unstable_by_key(|span| span.start);
    spans
}

/// Byte index one past the `}` closing the object opened at `start`.
fn object_end(spans: &[ObjectSpan], start: usize) -> Option<usize> {
    spans
        .binary_search_by_key(&start, |span| span.start)
        .ok()
        .map(|i| spans[i].end)
}

/// Find an argument object introduced by an argument key at or after `from`.
fn locate_arguments(text: &str, from: usize) -> Option<(usize, usize, Value)> {
    let spans = object_spans(text);
    let mut budget = parse_budget(text);
    for m in ARGS_RE.find_iter(&text[from..]) {
        let key_start = from + m.start();
        let open = from + m.end();
        let Some(end) = object_end(&spans, open) else {
            continue;
        };
        budget = budget.checked_sub(end - open)?;
        if let Some(args) = parse_lenient_object(&text[open..end]) {
            return Some((key_start, end, args));
        }
    }
    None
}

/// Parse a JSON object, falling back to single-quote and bare-key repair.
fn parse_lenient_object(raw: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value.is_object().then_some(value);
    }
    let requoted = requote_single_quoted(raw);
    let keyed = BARE_KEY_RE.replace_all(&requoted, r#"$1"$2":"#);
    serde_json::from_str::<Value>(&keyed)
        .ok()
        .filter(Value::is_object)
}

/// Rewrite `'...'` string literals as `"..."`.
fn requote_single_quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in raw.chars() {
        match quote {
            Some(q) if escaped => {
                escaped = false;
                if q == '\'' && c == '\'' {
                    out.pop();
                }
                out.push(c);
            },
            Some(_) if c == '\\' => {
                escaped = true;
                out.push(c);
            },
            Some('\'') if c == '\'' => {
                quote = None;
                out.push('"');
            },
            Some('\'') if c == '"' => out.push_str("\\\""),
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            },
            None if c == '\'' => {
                quote = Some('\'');
                out.push('"');
            },
            None => {
                if c == '"' {
                    quote = Some('"');
                }
                out.push(c);
            },
        }
    }
    out
}

fn parse_parameter_tags(body: &str) -> Option<serde_json::Map<String, Value>> {
    const OPEN: &str = "<parameter=";
    const CLOSE: &str = "</parameter>";

    let mut args = serde_json::Map::new();
    let mut cursor = 0usize;
    while let Some(rel) = body[cursor..].find(OPEN) {
        let name_start = cursor + rel + OPEN.len();
        let name_end = name_start + body[name_start..].find('>')?;
        let key = body[name_start..name_end].trim();
        let value_start = name_end + 1;
        let value_end = value_start + body[value_start..].find(CLOSE)?;
        cursor = value_end + CLOSE.len();
        if !is_valid_tool_name(key) {
            continue;
        }
        let raw = body[value_start..value_end].trim();
        let value = serde_json::from_str::<Value>(raw)
            .unwrap_or_else(|_| Value::String(raw.to_string()));
        args.insert(key.to_string(), value);
    }
    (!args.is_empty()).then_some(args)
}

fn remaining_around(text: &str, (start, end): (usize, usize)) -> Option<String> {
    let before = text[..start].trim().trim_end_matches('{').trim();
    let after = text[end..].trim().trim_start_matches('}').trim();
    compose_remaining_text(before, after)
}

fn compose_remaining_text(before: &str, after: &str) -> Option<String> {
    match (before.is_empty(), after.is_empty()) {
        (true, true) => None,
        (true, false) => Some(after.to_string()),
        (false, true) => Some(before.to_string()),
        (false, false) => Some(format!("{before}\n{after}")),
    }
}

fn trim_tool_call_wrappers(text: &str) -> &str {
    let mut value = text.trim();
    while let Some(s) = value
        .strip_prefix("<tool_call>")
        .or_else(|| value.strip_prefix("</tool_call>"))
    {
        value = s.trim();
    }
    while let Some(s) = value
        .strip_suffix("<tool_call>")
        .or_else(|| value.strip_suffix("</tool_call>"))
    {
        value = s.trim();
    }
    value
}
