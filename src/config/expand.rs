//! Stream template expansion.
//!
//! Each template yields one resolved stream per expansion value, with the
//! expansion variable substituted into the topic and into every string-typed
//! position of the payload tree. `{{` and `}}` escape literal braces.

use crate::config::model::{
    Expansion, GeneratorSpec, PayloadSpec, Plan, RangeExpansion, StreamTemplate,
};
use crate::error::ConfigError;
use serde_json::Value as JsonValue;

/// A concrete stream produced from one template and one expansion value.
///
/// Ordering is template order, then expansion order; `id` is stable and used
/// for logging and per-stream seed derivation.
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub id: String,
    pub broker: String,
    pub topic: String,
    pub interval: f64,
    pub qos: u8,
    pub retain: bool,
    pub payload: PayloadSpec,
}

/// Substitution context: the single expansion variable, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct Substitution<'a> {
    var: Option<(&'a str, &'a str)>,
}

impl<'a> Substitution<'a> {
    pub fn bind(name: &'a str, value: &'a str) -> Self {
        Self {
            var: Some((name, value)),
        }
    }

    fn lookup(&self, name: &str) -> Option<&'a str> {
        match self.var {
            Some((var, value)) if var == name => Some(value),
            _ => None,
        }
    }
}

/// Expand every template of the plan into its ordered resolved streams.
pub fn resolve_streams(plan: &Plan) -> Result<Vec<ResolvedStream>, ConfigError> {
    let mut resolved = Vec::new();
    for (index, template) in plan.streams.iter().enumerate() {
        resolve_template(index, template, &mut resolved)?;
    }
    Ok(resolved)
}

fn resolve_template(
    index: usize,
    template: &StreamTemplate,
    out: &mut Vec<ResolvedStream>,
) -> Result<(), ConfigError> {
    let base_id = template
        .name
        .clone()
        .unwrap_or_else(|| format!("stream-{index}"));

    match &template.expand {
        None => {
            out.push(build_resolved(base_id, template, Substitution::default())?);
        }
        Some(expansion) => {
            let var = expansion.var();
            for value in expansion_values(expansion) {
                let rendered = render_expansion_value(&value);
                let ctx = Substitution::bind(var, &rendered);
                let id = format!("{base_id}-{rendered}");
                out.push(build_resolved(id, template, ctx)?);
            }
        }
    }
    Ok(())
}

fn build_resolved(
    id: String,
    template: &StreamTemplate,
    ctx: Substitution<'_>,
) -> Result<ResolvedStream, ConfigError> {
    Ok(ResolvedStream {
        id,
        broker: template.broker.clone(),
        topic: render_template(&template.topic, ctx)?,
        interval: template.interval,
        qos: template.qos,
        retain: template.retain,
        payload: template_payload(&template.payload, ctx)?,
    })
}

/// Enumerate the expansion values in order.
fn expansion_values(expansion: &Expansion) -> Vec<JsonValue> {
    match expansion {
        Expansion::Range(range) => range_values(range).into_iter().map(JsonValue::from).collect(),
        Expansion::List(list) => list.values.clone(),
    }
}

fn range_values(range: &RangeExpansion) -> Vec<i64> {
    let mut values = Vec::new();
    let mut current = range.start;
    loop {
        let in_range = if range.step > 0 {
            current < range.stop || (range.inclusive && current == range.stop)
        } else {
            current > range.stop || (range.inclusive && current == range.stop)
        };
        if !in_range {
            break;
        }
        values.push(current);
        current = match current.checked_add(range.step) {
            Some(next) => next,
            None => break,
        };
    }
    values
}

fn render_expansion_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute `{name}` placeholders; `{{`/`}}` produce literal braces.
pub fn render_template(template: &str, ctx: Substitution<'_>) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => name.push(c),
                        None => return Err(ConfigError::UnbalancedBrace(template.to_string())),
                    }
                }
                match ctx.lookup(&name) {
                    Some(value) => out.push_str(value),
                    None => return Err(ConfigError::MissingVariable(name)),
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(ConfigError::UnbalancedBrace(template.to_string()));
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Apply substitution to every string-typed position of the payload tree.
fn template_payload(
    payload: &PayloadSpec,
    ctx: Substitution<'_>,
) -> Result<PayloadSpec, ConfigError> {
    let mut templated = payload.clone();
    match &mut templated {
        PayloadSpec::Text(text) => {
            text.value = render_template(&text.value, ctx)?;
        }
        PayloadSpec::Bytes(bytes) => {
            bytes.value = render_template(&bytes.value, ctx)?;
        }
        PayloadSpec::File(file) | PayloadSpec::PickleFile(file) => {
            file.path = render_template(&file.path, ctx)?;
        }
        PayloadSpec::Sequence(seq) => {
            for item in &mut seq.items {
                template_json_strings(item, ctx)?;
            }
        }
        PayloadSpec::JsonFields(fields) => {
            for field in &mut fields.fields {
                template_generator(&mut field.generator, ctx)?;
            }
        }
    }
    Ok(templated)
}

fn template_generator(
    generator: &mut GeneratorSpec,
    ctx: Substitution<'_>,
) -> Result<(), ConfigError> {
    match generator {
        GeneratorSpec::Const(spec) => template_json_strings(&mut spec.value, ctx),
        GeneratorSpec::Expression(spec) => {
            spec.expression = render_template(&spec.expression, ctx)?;
            Ok(())
        }
        GeneratorSpec::Choice(spec) => {
            for value in &mut spec.values {
                template_json_strings(value, ctx)?;
            }
            Ok(())
        }
        GeneratorSpec::Sequence(spec) => {
            for value in &mut spec.values {
                template_json_strings(value, ctx)?;
            }
            Ok(())
        }
        GeneratorSpec::BoolToggle(_)
        | GeneratorSpec::NumberWalk(_)
        | GeneratorSpec::NumberRandom(_)
        | GeneratorSpec::Timestamp(_)
        | GeneratorSpec::Uuid => Ok(()),
    }
}

fn template_json_strings(value: &mut JsonValue, ctx: Substitution<'_>) -> Result<(), ConfigError> {
    match value {
        JsonValue::String(s) => {
            *s = render_template(s, ctx)?;
            Ok(())
        }
        JsonValue::Array(items) => {
            for item in items {
                template_json_strings(item, ctx)?;
            }
            Ok(())
        }
        JsonValue::Object(map) => {
            for (_, item) in map.iter_mut() {
                template_json_strings(item, ctx)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
