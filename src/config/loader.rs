//! JSON plan loading and validation.
//!
//! The loader parses the config element-by-element so the first failure
//! carries a `streams[3].payload`-style path to the offending node. All
//! failures are fatal; nothing downstream runs on a partially valid plan.

use crate::config::expand::resolve_streams;
use crate::config::model::{
    BrokerSpec, Expansion, GeneratorSpec, JsonFieldsPayload, PayloadSpec, Plan, PlanSummary,
    StreamTemplate,
};
use crate::error::ConfigError;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const ROOT_KEYS: [&str; 3] = ["schema_version", "brokers", "streams"];

/// Load and validate a plan from a JSON config file.
pub fn load_plan(path: &Path) -> Result<Plan, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root: JsonValue = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let config_dir = resolve_config_dir(path)?;
    plan_from_value(root, config_dir)
}

/// Validate a config file and summarize it for the `validate` command.
pub fn validate_plan(path: &Path) -> Result<PlanSummary, ConfigError> {
    let plan = load_plan(path)?;
    let resolved = resolve_streams(&plan)?;
    let mut kinds: Vec<String> = plan
        .streams
        .iter()
        .map(|s| s.payload.kind().to_string())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    kinds.sort();
    Ok(PlanSummary {
        broker_count: plan.brokers.len(),
        stream_template_count: plan.streams.len(),
        resolved_stream_count: resolved.len(),
        payload_kinds: kinds,
    })
}

fn resolve_config_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let canonical = path.canonicalize().map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(canonical
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn plan_from_value(root: JsonValue, config_dir: PathBuf) -> Result<Plan, ConfigError> {
    let obj = root
        .as_object()
        .ok_or_else(|| ConfigError::validation("<root>", "config root must be a JSON object"))?;

    for key in obj.keys() {
        if !ROOT_KEYS.contains(&key.as_str()) {
            return Err(ConfigError::validation(
                "<root>",
                format!("unknown top-level key \"{key}\""),
            ));
        }
    }

    let schema_version = obj
        .get("schema_version")
        .ok_or_else(|| ConfigError::validation("schema_version", "missing required key"))?
        .as_u64()
        .ok_or_else(|| ConfigError::validation("schema_version", "must be an integer"))?;
    if schema_version != 1 {
        return Err(ConfigError::validation(
            "schema_version",
            format!("must be 1, got {schema_version}"),
        ));
    }

    let brokers = parse_brokers(obj.get("brokers"))?;
    let streams = parse_streams(obj.get("streams"), &brokers)?;

    Ok(Plan {
        schema_version: schema_version as u32,
        brokers,
        streams,
        config_dir,
    })
}

fn parse_brokers(value: Option<&JsonValue>) -> Result<Vec<BrokerSpec>, ConfigError> {
    let array = value
        .ok_or_else(|| ConfigError::validation("brokers", "missing required key"))?
        .as_array()
        .ok_or_else(|| ConfigError::validation("brokers", "must be an array"))?;
    if array.is_empty() {
        return Err(ConfigError::validation("brokers", "must not be empty"));
    }

    let mut brokers = Vec::with_capacity(array.len());
    let mut seen = HashSet::new();
    for (index, item) in array.iter().enumerate() {
        let path = format!("brokers[{index}]");
        let broker: BrokerSpec = serde_json::from_value(item.clone())
            .map_err(|err| ConfigError::validation(&path, err.to_string()))?;
        if broker.name.is_empty() {
            return Err(ConfigError::validation(
                format!("{path}.name"),
                "must not be empty",
            ));
        }
        if broker.host.is_empty() {
            return Err(ConfigError::validation(
                format!("{path}.host"),
                "must not be empty",
            ));
        }
        if broker.keepalive == 0 {
            return Err(ConfigError::validation(
                format!("{path}.keepalive"),
                "must be >= 1",
            ));
        }
        if !seen.insert(broker.name.clone()) {
            return Err(ConfigError::validation(
                format!("{path}.name"),
                format!("duplicate broker name \"{}\"", broker.name),
            ));
        }
        brokers.push(broker);
    }
    Ok(brokers)
}

fn parse_streams(
    value: Option<&JsonValue>,
    brokers: &[BrokerSpec],
) -> Result<Vec<StreamTemplate>, ConfigError> {
    let array = value
        .ok_or_else(|| ConfigError::validation("streams", "missing required key"))?
        .as_array()
        .ok_or_else(|| ConfigError::validation("streams", "must be an array"))?;
    if array.is_empty() {
        return Err(ConfigError::validation("streams", "must not be empty"));
    }

    let mut streams = Vec::with_capacity(array.len());
    for (index, item) in array.iter().enumerate() {
        let path = format!("streams[{index}]");
        let stream = parse_stream(item, &path)?;
        if !brokers.iter().any(|b| b.name == stream.broker) {
            return Err(ConfigError::validation(
                format!("{path}.broker"),
                format!("unknown broker \"{}\"", stream.broker),
            ));
        }
        streams.push(stream);
    }
    Ok(streams)
}

/// Shell used to qualify payload/expand parse errors with their own path.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct StreamShell {
    #[serde(default)]
    name: Option<String>,
    broker: String,
    topic: String,
    interval: f64,
    #[serde(default)]
    qos: u8,
    #[serde(default)]
    retain: bool,
    payload: JsonValue,
    #[serde(default)]
    expand: Option<JsonValue>,
}

fn parse_stream(value: &JsonValue, path: &str) -> Result<StreamTemplate, ConfigError> {
    let shell: StreamShell = serde_json::from_value(value.clone())
        .map_err(|err| ConfigError::validation(path, err.to_string()))?;

    if shell.topic.is_empty() {
        return Err(ConfigError::validation(
            format!("{path}.topic"),
            "must not be empty",
        ));
    }
    if !(shell.interval.is_finite() && shell.interval > 0.0) {
        return Err(ConfigError::validation(
            format!("{path}.interval"),
            "must be > 0",
        ));
    }
    if shell.qos > 2 {
        return Err(ConfigError::validation(
            format!("{path}.qos"),
            format!("must be 0, 1, or 2, got {}", shell.qos),
        ));
    }

    let payload: PayloadSpec = serde_json::from_value(shell.payload)
        .map_err(|err| ConfigError::validation(format!("{path}.payload"), err.to_string()))?;
    validate_payload(&payload, &format!("{path}.payload"))?;

    let expand = match shell.expand {
        Some(raw) => {
            let expansion: Expansion = serde_json::from_value(raw).map_err(|err| {
                ConfigError::validation(format!("{path}.expand"), err.to_string())
            })?;
            validate_expansion(&expansion, &format!("{path}.expand"))?;
            Some(expansion)
        }
        None => None,
    };

    Ok(StreamTemplate {
        name: shell.name,
        broker: shell.broker,
        topic: shell.topic,
        interval: shell.interval,
        qos: shell.qos,
        retain: shell.retain,
        payload,
        expand,
    })
}

fn validate_expansion(expansion: &Expansion, path: &str) -> Result<(), ConfigError> {
    if expansion.var().is_empty() {
        return Err(ConfigError::validation(
            format!("{path}.var"),
            "must not be empty",
        ));
    }
    match expansion {
        Expansion::Range(range) => {
            if range.step == 0 {
                return Err(ConfigError::validation(
                    format!("{path}.step"),
                    "must not be 0",
                ));
            }
        }
        Expansion::List(list) => {
            if list.values.is_empty() {
                return Err(ConfigError::validation(
                    format!("{path}.values"),
                    "must not be empty",
                ));
            }
        }
    }
    Ok(())
}

fn validate_payload(payload: &PayloadSpec, path: &str) -> Result<(), ConfigError> {
    match payload {
        PayloadSpec::Text(_) | PayloadSpec::Bytes(_) => Ok(()),
        PayloadSpec::File(file) | PayloadSpec::PickleFile(file) => {
            if file.path.is_empty() {
                return Err(ConfigError::validation(
                    format!("{path}.path"),
                    "must not be empty",
                ));
            }
            Ok(())
        }
        PayloadSpec::Sequence(seq) => {
            if seq.items.is_empty() {
                return Err(ConfigError::validation(
                    format!("{path}.items"),
                    "must not be empty",
                ));
            }
            Ok(())
        }
        PayloadSpec::JsonFields(fields) => validate_json_fields(fields, path),
    }
}

fn validate_json_fields(payload: &JsonFieldsPayload, path: &str) -> Result<(), ConfigError> {
    if payload.fields.is_empty() {
        return Err(ConfigError::validation(
            format!("{path}.fields"),
            "must not be empty",
        ));
    }
    for (index, field) in payload.fields.iter().enumerate() {
        let field_path = format!("{path}.fields[{index}]");
        if field.name.is_empty() {
            return Err(ConfigError::validation(
                format!("{field_path}.name"),
                "must not be empty",
            ));
        }
        validate_generator(&field.generator, &format!("{field_path}.generator"))?;
    }
    Ok(())
}

fn validate_generator(generator: &GeneratorSpec, path: &str) -> Result<(), ConfigError> {
    match generator {
        GeneratorSpec::NumberWalk(walk) => {
            if walk.min > walk.max {
                return Err(ConfigError::validation(path, "min must be <= max"));
            }
            if walk.step <= 0.0 {
                return Err(ConfigError::validation(
                    format!("{path}.step"),
                    "must be > 0",
                ));
            }
            Ok(())
        }
        GeneratorSpec::NumberRandom(random) => {
            if random.min > random.max {
                return Err(ConfigError::validation(path, "min must be <= max"));
            }
            Ok(())
        }
        GeneratorSpec::Choice(choice) => {
            if choice.values.is_empty() {
                return Err(ConfigError::validation(
                    format!("{path}.values"),
                    "must not be empty",
                ));
            }
            Ok(())
        }
        GeneratorSpec::Sequence(seq) => {
            if seq.values.is_empty() {
                return Err(ConfigError::validation(
                    format!("{path}.values"),
                    "must not be empty",
                ));
            }
            Ok(())
        }
        GeneratorSpec::Expression(expr) => {
            if expr.expression.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("{path}.expression"),
                    "must not be empty",
                ));
            }
            Ok(())
        }
        GeneratorSpec::Const(_)
        | GeneratorSpec::BoolToggle(_)
        | GeneratorSpec::Timestamp(_)
        | GeneratorSpec::Uuid => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_config(value: &JsonValue) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string(value).unwrap().as_bytes())
            .unwrap();
        (dir, path)
    }

    fn minimal_config() -> JsonValue {
        json!({
            "schema_version": 1,
            "brokers": [{"name": "main", "host": "localhost"}],
            "streams": [{
                "broker": "main",
                "topic": "demo/topic",
                "interval": 0.5,
                "payload": {"kind": "text", "value": "hello"}
            }]
        })
    }

    #[test]
    fn test_load_minimal_plan() {
        let (_dir, path) = write_config(&minimal_config());
        let plan = load_plan(&path).unwrap();
        assert_eq!(plan.schema_version, 1);
        assert_eq!(plan.brokers.len(), 1);
        assert_eq!(plan.streams.len(), 1);
        assert_eq!(plan.streams[0].qos, 0);
        assert!(!plan.streams[0].retain);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_plan(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_plan(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn test_unknown_root_key_rejected() {
        let mut config = minimal_config();
        config["extras"] = json!({});
        let (_dir, path) = write_config(&config);
        let err = load_plan(&path).unwrap_err();
        assert!(err.to_string().contains("unknown top-level key"));
    }

    #[test]
    fn test_schema_version_must_be_one() {
        let mut config = minimal_config();
        config["schema_version"] = json!(2);
        let (_dir, path) = write_config(&config);
        let err = load_plan(&path).unwrap_err();
        assert!(err.to_string().contains("schema_version"));
    }

    #[test]
    fn test_duplicate_broker_names() {
        let mut config = minimal_config();
        config["brokers"] = json!([
            {"name": "main", "host": "a"},
            {"name": "main", "host": "b"}
        ]);
        let (_dir, path) = write_config(&config);
        let err = load_plan(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate broker name"));
        assert!(err.to_string().contains("brokers[1].name"));
    }

    #[test]
    fn test_unknown_broker_reference() {
        let mut config = minimal_config();
        config["streams"][0]["broker"] = json!("other");
        let (_dir, path) = write_config(&config);
        let err = load_plan(&path).unwrap_err();
        assert!(err.to_string().contains("streams[0].broker"));
        assert!(err.to_string().contains("unknown broker"));
    }

    #[test]
    fn test_invalid_interval_and_qos() {
        let mut config = minimal_config();
        config["streams"][0]["interval"] = json!(0);
        let (_dir, path) = write_config(&config);
        assert!(load_plan(&path)
            .unwrap_err()
            .to_string()
            .contains("streams[0].interval"));

        let mut config = minimal_config();
        config["streams"][0]["qos"] = json!(3);
        let (_dir, path) = write_config(&config);
        assert!(load_plan(&path)
            .unwrap_err()
            .to_string()
            .contains("streams[0].qos"));
    }

    #[test]
    fn test_unknown_payload_kind_path() {
        let mut config = minimal_config();
        config["streams"][0]["payload"] = json!({"kind": "foo"});
        let (_dir, path) = write_config(&config);
        let err = load_plan(&path).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("streams[0].payload"));
        assert!(text.contains("unknown payload kind \"foo\""));
    }

    #[test]
    fn test_generator_bounds_checked() {
        let mut config = minimal_config();
        config["streams"][0]["payload"] = json!({
            "kind": "json_fields",
            "fields": [{
                "name": "temp",
                "generator": {"kind": "number_walk", "min": 5.0, "max": 1.0}
            }]
        });
        let (_dir, path) = write_config(&config);
        let err = load_plan(&path).unwrap_err();
        assert!(err.to_string().contains("min must be <= max"));
        assert!(err
            .to_string()
            .contains("streams[0].payload.fields[0].generator"));
    }

    #[test]
    fn test_expansion_step_zero_rejected() {
        let mut config = minimal_config();
        config["streams"][0]["expand"] =
            json!({"kind": "range", "var": "id", "start": 1, "stop": 3, "step": 0});
        let (_dir, path) = write_config(&config);
        let err = load_plan(&path).unwrap_err();
        assert!(err.to_string().contains("streams[0].expand.step"));
    }

    #[test]
    fn test_validate_summary() {
        let mut config = minimal_config();
        config["streams"][0]["topic"] = json!("devices/{id}/status");
        config["streams"][0]["payload"] = json!({"kind": "text", "value": "hello-{id}"});
        config["streams"][0]["expand"] =
            json!({"kind": "range", "var": "id", "start": 1, "stop": 3});
        let (_dir, path) = write_config(&config);
        let summary = validate_plan(&path).unwrap();
        assert_eq!(summary.broker_count, 1);
        assert_eq!(summary.stream_template_count, 1);
        assert_eq!(summary.resolved_stream_count, 3);
        assert_eq!(summary.payload_kinds, vec!["text".to_string()]);
    }

    #[test]
    fn test_empty_streams_rejected() {
        let mut config = minimal_config();
        config["streams"] = json!([]);
        let (_dir, path) = write_config(&config);
        assert!(load_plan(&path)
            .unwrap_err()
            .to_string()
            .contains("streams"));
    }
}
