//! Plan data model.
//!
//! The plan is the fully validated, immutable configuration tree. Payload and
//! generator specs are closed kinded variants: deserialization reads the
//! `kind` tag first, then parses the remaining keys strictly, so unknown
//! kinds and unknown fields are rejected rather than ignored.

use serde::de::{self, Deserialize, Deserializer};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::PathBuf;

/// The fully validated configuration tree, read-only after load.
#[derive(Debug, Clone)]
pub struct Plan {
    pub schema_version: u32,
    pub brokers: Vec<BrokerSpec>,
    pub streams: Vec<StreamTemplate>,
    /// Directory of the config file, used to resolve relative payload paths.
    pub config_dir: PathBuf,
}

impl Plan {
    /// Look up a broker spec by name.
    pub fn broker(&self, name: &str) -> Option<&BrokerSpec> {
        self.brokers.iter().find(|b| b.name == name)
    }
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSpec {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u64 {
    60
}

/// A stream declaration that may expand into multiple resolved streams.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamTemplate {
    #[serde(default)]
    pub name: Option<String>,
    pub broker: String,
    pub topic: String,
    /// Publish cadence in seconds, must be > 0.
    pub interval: f64,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    pub payload: PayloadSpec,
    #[serde(default)]
    pub expand: Option<Expansion>,
}

/// Rule producing resolved streams from a template.
#[derive(Debug, Clone)]
pub enum Expansion {
    Range(RangeExpansion),
    List(ListExpansion),
}

impl Expansion {
    /// The substitution variable this expansion binds.
    pub fn var(&self) -> &str {
        match self {
            Expansion::Range(r) => &r.var,
            Expansion::List(l) => &l.var,
        }
    }
}

/// Integer-range expansion: `start`, `start + step`, ... up to `stop`.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeExpansion {
    pub var: String,
    pub start: i64,
    pub stop: i64,
    #[serde(default = "default_step")]
    pub step: i64,
    #[serde(default = "default_true")]
    pub inclusive: bool,
}

/// Value-list expansion: one resolved stream per listed value, in order.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListExpansion {
    pub var: String,
    pub values: Vec<JsonValue>,
}

fn default_step() -> i64 {
    1
}

fn default_true() -> bool {
    true
}

impl<'de> Deserialize<'de> for Expansion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        let (kind, rest) = split_kind(&value).map_err(de::Error::custom)?;
        match kind.as_str() {
            "range" => serde_json::from_value(rest)
                .map(Expansion::Range)
                .map_err(de::Error::custom),
            "list" => serde_json::from_value(rest)
                .map(Expansion::List)
                .map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "unknown expansion kind \"{other}\" (expected \"range\" or \"list\")"
            ))),
        }
    }
}

/// Payload spec for a stream, one closed variant per `kind`.
#[derive(Debug, Clone)]
pub enum PayloadSpec {
    Text(TextPayload),
    Bytes(BytesPayload),
    File(FilePayload),
    PickleFile(FilePayload),
    Sequence(SequencePayload),
    JsonFields(JsonFieldsPayload),
}

impl PayloadSpec {
    /// The config-facing kind tag, used in summaries and previews.
    pub fn kind(&self) -> &'static str {
        match self {
            PayloadSpec::Text(_) => "text",
            PayloadSpec::Bytes(_) => "bytes",
            PayloadSpec::File(_) => "file",
            PayloadSpec::PickleFile(_) => "pickle_file",
            PayloadSpec::Sequence(_) => "sequence",
            PayloadSpec::JsonFields(_) => "json_fields",
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextPayload {
    pub value: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BytesPayload {
    pub value: String,
    #[serde(default)]
    pub encoding: ByteEncoding,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilePayload {
    pub path: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequencePayload {
    pub items: Vec<JsonValue>,
    #[serde(default)]
    pub encoding: SequenceEncoding,
    #[serde(default = "default_true", rename = "loop")]
    pub looped: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonFieldsPayload {
    pub fields: Vec<FieldSpec>,
}

/// One named field of a `json_fields` payload.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub generator: GeneratorSpec,
}

impl<'de> Deserialize<'de> for PayloadSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        let (kind, rest) = split_kind(&value).map_err(de::Error::custom)?;
        let parsed = match kind.as_str() {
            "text" => serde_json::from_value(rest).map(PayloadSpec::Text),
            "bytes" => serde_json::from_value(rest).map(PayloadSpec::Bytes),
            "file" => serde_json::from_value(rest).map(PayloadSpec::File),
            "pickle_file" => serde_json::from_value(rest).map(PayloadSpec::PickleFile),
            "sequence" => serde_json::from_value(rest).map(PayloadSpec::Sequence),
            "json_fields" => serde_json::from_value(rest).map(PayloadSpec::JsonFields),
            other => {
                return Err(de::Error::custom(format!(
                    "unknown payload kind \"{other}\""
                )))
            }
        };
        parsed.map_err(de::Error::custom)
    }
}

/// Value generator spec used inside `json_fields`, one closed variant per `kind`.
#[derive(Debug, Clone)]
pub enum GeneratorSpec {
    Const(ConstSpec),
    BoolToggle(BoolToggleSpec),
    NumberWalk(NumberWalkSpec),
    NumberRandom(NumberRandomSpec),
    Choice(ChoiceSpec),
    Sequence(SequenceSpec),
    Expression(ExpressionSpec),
    Timestamp(TimestampSpec),
    Uuid,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstSpec {
    pub value: JsonValue,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoolToggleSpec {
    #[serde(default)]
    pub start: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberWalkSpec {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default = "default_walk_step")]
    pub step: f64,
    #[serde(default)]
    pub numeric_type: NumericType,
    #[serde(default)]
    pub start: Option<f64>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumberRandomSpec {
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default)]
    pub numeric_type: NumericType,
    #[serde(default)]
    pub precision: Option<u32>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChoiceSpec {
    pub values: Vec<JsonValue>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceSpec {
    pub values: Vec<JsonValue>,
    #[serde(default = "default_true", rename = "loop")]
    pub looped: bool,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpressionSpec {
    pub expression: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimestampSpec {
    #[serde(default)]
    pub mode: TimestampMode,
}

fn default_max() -> f64 {
    100.0
}

fn default_walk_step() -> f64 {
    1.0
}

impl<'de> Deserialize<'de> for GeneratorSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        let (kind, rest) = split_kind(&value).map_err(de::Error::custom)?;
        let parsed = match kind.as_str() {
            "const" => serde_json::from_value(rest).map(GeneratorSpec::Const),
            "bool_toggle" => serde_json::from_value(rest).map(GeneratorSpec::BoolToggle),
            "number_walk" => serde_json::from_value(rest).map(GeneratorSpec::NumberWalk),
            "number_random" => serde_json::from_value(rest).map(GeneratorSpec::NumberRandom),
            "choice" => serde_json::from_value(rest).map(GeneratorSpec::Choice),
            "sequence" => serde_json::from_value(rest).map(GeneratorSpec::Sequence),
            "expression" => serde_json::from_value(rest).map(GeneratorSpec::Expression),
            "timestamp" => serde_json::from_value(rest).map(GeneratorSpec::Timestamp),
            "uuid" => {
                let rest: EmptySpec = serde_json::from_value(rest).map_err(de::Error::custom)?;
                let EmptySpec {} = rest;
                Ok(GeneratorSpec::Uuid)
            }
            other => {
                return Err(de::Error::custom(format!(
                    "unknown generator kind \"{other}\""
                )))
            }
        };
        parsed.map_err(de::Error::custom)
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct EmptySpec {}

/// Numeric output type for `number_walk` and `number_random`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericType {
    Int,
    #[default]
    Float,
}

/// Timestamp output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampMode {
    #[default]
    Iso,
    Unix,
}

/// Inline `bytes` payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteEncoding {
    #[default]
    Utf8,
    Hex,
    Base64,
}

/// `sequence` payload item encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceEncoding {
    #[default]
    Text,
    Json,
}

/// Compact summary of a validated plan, printed by `validate`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub broker_count: usize,
    pub stream_template_count: usize,
    pub resolved_stream_count: usize,
    pub payload_kinds: Vec<String>,
}

impl PlanSummary {
    /// Format the summary for CLI output.
    pub fn render(&self) -> String {
        let kinds = if self.payload_kinds.is_empty() {
            "-".to_string()
        } else {
            self.payload_kinds.join(", ")
        };
        format!(
            "Config valid: brokers={} stream_templates={} resolved_streams={} payload_kinds=[{}]",
            self.broker_count, self.stream_template_count, self.resolved_stream_count, kinds
        )
    }
}

fn split_kind(value: &JsonValue) -> Result<(String, JsonValue), String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "expected a JSON object with a \"kind\" tag".to_string())?;
    let kind = obj
        .get("kind")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| "missing string \"kind\" tag".to_string())?
        .to_string();
    let mut rest = obj.clone();
    rest.remove("kind");
    Ok((kind, JsonValue::Object(rest)))
}
