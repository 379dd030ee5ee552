//! Stateful value generators used by `json_fields` payloads.
//!
//! One generator instance per resolved-stream field; state never crosses
//! streams. Each call to [`ValueGenerator::next`] yields exactly one value.

use crate::config::model::{GeneratorSpec, NumericType, TimestampMode};
use crate::error::GeneratorError;
use crate::sim::expr::{CompiledExpr, EvalContext};
use crate::sim::rng::SharedRng;
use crate::sim::value::Value;
use chrono::{SecondsFormat, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

/// A stateful single-value producer.
#[derive(Debug)]
pub enum ValueGenerator {
    Const {
        value: Value,
    },
    BoolToggle {
        value: bool,
    },
    NumberWalk(NumberWalk),
    NumberRandom {
        min: f64,
        max: f64,
        numeric_type: NumericType,
        precision: Option<u32>,
        rng: SharedRng,
    },
    Choice {
        values: Vec<Value>,
        rng: SharedRng,
    },
    Sequence {
        values: Vec<Value>,
        looped: bool,
        index: usize,
    },
    Expression(ExpressionGenerator),
    Timestamp {
        mode: TimestampMode,
    },
    Uuid,
}

impl ValueGenerator {
    /// Build a generator from its validated spec.
    pub fn from_spec(spec: &GeneratorSpec, rng: SharedRng) -> Result<ValueGenerator, GeneratorError> {
        match spec {
            GeneratorSpec::Const(c) => Ok(ValueGenerator::Const {
                value: Value::from_json(&c.value),
            }),
            GeneratorSpec::BoolToggle(t) => Ok(ValueGenerator::BoolToggle { value: t.start }),
            GeneratorSpec::NumberWalk(w) => Ok(ValueGenerator::NumberWalk(NumberWalk::new(
                w.min,
                w.max,
                w.step,
                w.numeric_type,
                w.start,
            )?)),
            GeneratorSpec::NumberRandom(r) => {
                if r.min > r.max {
                    return Err(GeneratorError::InvalidSpec(
                        "number_random min must be <= max".to_string(),
                    ));
                }
                Ok(ValueGenerator::NumberRandom {
                    min: r.min,
                    max: r.max,
                    numeric_type: r.numeric_type,
                    precision: r.precision,
                    rng,
                })
            }
            GeneratorSpec::Choice(c) => {
                if c.values.is_empty() {
                    return Err(GeneratorError::InvalidSpec(
                        "choice requires a non-empty values list".to_string(),
                    ));
                }
                Ok(ValueGenerator::Choice {
                    values: c.values.iter().map(Value::from_json).collect(),
                    rng,
                })
            }
            GeneratorSpec::Sequence(s) => {
                if s.values.is_empty() {
                    return Err(GeneratorError::InvalidSpec(
                        "sequence requires a non-empty values list".to_string(),
                    ));
                }
                Ok(ValueGenerator::Sequence {
                    values: s.values.iter().map(Value::from_json).collect(),
                    looped: s.looped,
                    index: 0,
                })
            }
            GeneratorSpec::Expression(e) => Ok(ValueGenerator::Expression(
                ExpressionGenerator::new(&e.expression, rng)?,
            )),
            GeneratorSpec::Timestamp(t) => Ok(ValueGenerator::Timestamp { mode: t.mode }),
            GeneratorSpec::Uuid => Ok(ValueGenerator::Uuid),
        }
    }

    /// Produce the next value, advancing any per-instance state.
    pub fn next(&mut self) -> Result<Value, GeneratorError> {
        match self {
            ValueGenerator::Const { value } => Ok(value.clone()),
            ValueGenerator::BoolToggle { value } => {
                let current = *value;
                *value = !current;
                Ok(Value::Bool(current))
            }
            ValueGenerator::NumberWalk(walk) => Ok(walk.next()),
            ValueGenerator::NumberRandom {
                min,
                max,
                numeric_type,
                precision,
                rng,
            } => {
                let mut rng = rng.lock().expect("stream rng poisoned");
                match numeric_type {
                    NumericType::Int => {
                        let low = min.trunc() as i64;
                        let high = max.trunc() as i64;
                        Ok(Value::Int(rng.gen_range(low..=high)))
                    }
                    NumericType::Float => {
                        let mut value: f64 = rng.gen_range(*min..=*max);
                        if let Some(digits) = precision {
                            let scale = 10f64.powi(*digits as i32);
                            value = (value * scale).round() / scale;
                        }
                        Ok(Value::Float(value))
                    }
                }
            }
            ValueGenerator::Choice { values, rng } => {
                let mut rng = rng.lock().expect("stream rng poisoned");
                Ok(values
                    .choose(&mut *rng)
                    .cloned()
                    .expect("choice values validated non-empty"))
            }
            ValueGenerator::Sequence {
                values,
                looped,
                index,
            } => {
                if *index >= values.len() {
                    if *looped {
                        *index = 0;
                    } else {
                        return Ok(values[values.len() - 1].clone());
                    }
                }
                let value = values[*index].clone();
                *index += 1;
                Ok(value)
            }
            ValueGenerator::Expression(expr) => expr.next(),
            ValueGenerator::Timestamp { mode } => Ok(match mode {
                TimestampMode::Iso => {
                    Value::Str(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
                }
                TimestampMode::Unix => {
                    Value::Float(Utc::now().timestamp_micros() as f64 / 1_000_000.0)
                }
            }),
            ValueGenerator::Uuid => Ok(Value::Str(uuid::Uuid::new_v4().to_string())),
        }
    }
}

/// Bounded back-and-forth numeric walk.
#[derive(Debug)]
pub struct NumberWalk {
    min: f64,
    max: f64,
    step: f64,
    numeric_type: NumericType,
    current: f64,
    direction: f64,
}

impl NumberWalk {
    fn new(
        min: f64,
        max: f64,
        step: f64,
        numeric_type: NumericType,
        start: Option<f64>,
    ) -> Result<NumberWalk, GeneratorError> {
        if min > max {
            return Err(GeneratorError::InvalidSpec(
                "number_walk min must be <= max".to_string(),
            ));
        }
        if step <= 0.0 {
            return Err(GeneratorError::InvalidSpec(
                "number_walk step must be > 0".to_string(),
            ));
        }
        Ok(NumberWalk {
            min,
            max,
            step,
            numeric_type,
            current: start.unwrap_or(min),
            direction: 1.0,
        })
    }

    /// Return the current value, then advance; reverse and clamp at bounds.
    fn next(&mut self) -> Value {
        let value = self.current;
        let mut next = value + self.step * self.direction;
        if next > self.max || next < self.min {
            self.direction = -self.direction;
            next = value + self.step * self.direction;
            next = next.clamp(self.min, self.max);
        }
        self.current = next;
        match self.numeric_type {
            // ties round to even, like Python's round()
            NumericType::Int => Value::Int(value.round_ties_even() as i64),
            NumericType::Float => Value::Float(value),
        }
    }
}

/// The `expression` generator: compiled once, evaluated per publish with
/// per-instance `prev`/`count` state.
#[derive(Debug)]
pub struct ExpressionGenerator {
    compiled: CompiledExpr,
    rng: SharedRng,
    prev: Value,
    count: i64,
}

impl ExpressionGenerator {
    pub fn new(source: &str, rng: SharedRng) -> Result<ExpressionGenerator, GeneratorError> {
        if source.trim().is_empty() {
            return Err(GeneratorError::InvalidSpec(
                "expression must not be empty".to_string(),
            ));
        }
        Ok(ExpressionGenerator {
            compiled: CompiledExpr::parse(source)?,
            rng,
            prev: Value::Null,
            count: 0,
        })
    }

    fn next(&mut self) -> Result<Value, GeneratorError> {
        let mut rng = self.rng.lock().expect("stream rng poisoned");
        // `random` is drawn once per call whether or not the expression uses it
        let random: f64 = rng.gen();
        let time = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        let mut ctx = EvalContext {
            prev: &self.prev,
            count: self.count,
            random,
            time,
            rng: &mut *rng,
        };
        let value = self.compiled.eval(&mut ctx)?;
        // state only advances on success
        self.prev = value.clone();
        self.count += 1;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::rng::SimRng;
    use serde_json::json;

    fn rng() -> SharedRng {
        SimRng::new(Some(42)).derive(0)
    }

    fn generator(spec: serde_json::Value) -> ValueGenerator {
        let spec: GeneratorSpec = serde_json::from_value(spec).unwrap();
        ValueGenerator::from_spec(&spec, rng()).unwrap()
    }

    fn take(generator: &mut ValueGenerator, n: usize) -> Vec<Value> {
        (0..n).map(|_| generator.next().unwrap()).collect()
    }

    #[test]
    fn test_const_repeats() {
        let mut g = generator(json!({"kind": "const", "value": 21}));
        assert_eq!(take(&mut g, 3), vec![Value::Int(21); 3]);
    }

    #[test]
    fn test_bool_toggle_starts_at_start() {
        let mut g = generator(json!({"kind": "bool_toggle", "start": true}));
        let bools: Vec<_> = take(&mut g, 5);
        assert_eq!(
            bools,
            vec![
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(true)
            ]
        );
    }

    #[test]
    fn test_number_walk_reverses_at_bounds() {
        let mut g = generator(json!({
            "kind": "number_walk",
            "min": 0, "max": 3, "step": 1, "numeric_type": "int", "start": 0
        }));
        let values: Vec<i64> = take(&mut g, 10)
            .into_iter()
            .map(|v| match v {
                Value::Int(i) => i,
                other => panic!("expected int, got {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 2, 1, 0, 1, 2, 3]);
    }

    #[test]
    fn test_number_walk_int_rounds_ties_to_even() {
        let mut g = generator(json!({
            "kind": "number_walk",
            "min": 0, "max": 2, "step": 0.5, "numeric_type": "int", "start": 0
        }));
        let values: Vec<i64> = take(&mut g, 5)
            .into_iter()
            .map(|v| match v {
                Value::Int(i) => i,
                other => panic!("expected int, got {other:?}"),
            })
            .collect();
        // raw walk 0, 0.5, 1.0, 1.5, 2.0: the halves round to the even neighbor
        assert_eq!(values, vec![0, 0, 1, 2, 2]);
    }

    #[test]
    fn test_number_walk_stays_in_bounds() {
        let mut g = generator(json!({
            "kind": "number_walk",
            "min": -1.5, "max": 2.0, "step": 0.7, "numeric_type": "float", "start": 0.4
        }));
        for value in take(&mut g, 50) {
            match value {
                Value::Float(v) => assert!((-1.5..=2.0).contains(&v), "out of bounds: {v}"),
                other => panic!("expected float, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_number_random_int_inclusive() {
        let mut g = generator(json!({
            "kind": "number_random", "min": 1, "max": 3, "numeric_type": "int"
        }));
        let mut seen = std::collections::HashSet::new();
        for value in take(&mut g, 200) {
            match value {
                Value::Int(v) => {
                    assert!((1..=3).contains(&v));
                    seen.insert(v);
                }
                other => panic!("expected int, got {other:?}"),
            }
        }
        assert_eq!(seen.len(), 3, "all inclusive values should appear");
    }

    #[test]
    fn test_number_random_precision() {
        let mut g = generator(json!({
            "kind": "number_random", "min": 0, "max": 10,
            "numeric_type": "float", "precision": 2
        }));
        for value in take(&mut g, 20) {
            match value {
                Value::Float(v) => {
                    let scaled = v * 100.0;
                    assert!((scaled - scaled.round()).abs() < 1e-9, "not rounded: {v}");
                }
                other => panic!("expected float, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_choice_only_picks_configured_values() {
        let mut g = generator(json!({"kind": "choice", "values": ["a", "b", "c"]}));
        for value in take(&mut g, 50) {
            match value {
                Value::Str(s) => assert!(["a", "b", "c"].contains(&s.as_str())),
                other => panic!("expected string, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_sequence_loop_and_clamp() {
        let mut looped = generator(json!({
            "kind": "sequence", "values": ["a", "b"], "loop": true
        }));
        let values: Vec<_> = take(&mut looped, 5)
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(values, vec!["a", "b", "a", "b", "a"]);

        let mut clamped = generator(json!({
            "kind": "sequence", "values": ["a", "b", "c"], "loop": false
        }));
        let values: Vec<_> = take(&mut clamped, 5)
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(values, vec!["a", "b", "c", "c", "c"]);
    }

    #[test]
    fn test_expression_stateful() {
        let mut g = generator(json!({"kind": "expression", "expression": "(prev or 10) + 1"}));
        let values: Vec<_> = take(&mut g, 4);
        assert_eq!(
            values,
            vec![Value::Int(11), Value::Int(12), Value::Int(13), Value::Int(14)]
        );
    }

    #[test]
    fn test_expression_error_leaves_state() {
        let mut g = generator(json!({
            "kind": "expression", "expression": "(prev or 0) + 1 / (1 - count)"
        }));
        // count 0: divides by 1, fine
        assert_eq!(g.next().unwrap(), Value::Float(1.0));
        // count 1: divides by zero, fails without advancing state
        assert!(g.next().is_err());
        if let ValueGenerator::Expression(expr) = &g {
            assert_eq!(expr.count, 1);
            assert_eq!(expr.prev, Value::Float(1.0));
        } else {
            unreachable!()
        }
    }

    #[test]
    fn test_seeded_determinism() {
        let build = || {
            let spec: GeneratorSpec = serde_json::from_value(json!({
                "kind": "number_random", "min": 0, "max": 1000, "numeric_type": "int"
            }))
            .unwrap();
            ValueGenerator::from_spec(&spec, SimRng::new(Some(7)).derive(2)).unwrap()
        };
        let mut a = build();
        let mut b = build();
        assert_eq!(take(&mut a, 32), take(&mut b, 32));
    }

    #[test]
    fn test_timestamp_and_uuid_shapes() {
        let mut iso = generator(json!({"kind": "timestamp", "mode": "iso"}));
        match iso.next().unwrap() {
            Value::Str(s) => assert!(s.ends_with('Z') && s.contains('T')),
            other => panic!("expected string, got {other:?}"),
        }
        let mut unix = generator(json!({"kind": "timestamp", "mode": "unix"}));
        assert!(matches!(unix.next().unwrap(), Value::Float(v) if v > 1.0e9));

        let mut uuid_gen = generator(json!({"kind": "uuid"}));
        match uuid_gen.next().unwrap() {
            Value::Str(s) => {
                assert_eq!(s.len(), 36);
                assert!(uuid::Uuid::parse_str(&s).is_ok());
            }
            other => panic!("expected string, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let spec: GeneratorSpec = serde_json::from_value(json!({
            "kind": "number_walk", "min": 5, "max": 1
        }))
        .unwrap();
        assert!(matches!(
            ValueGenerator::from_spec(&spec, rng()),
            Err(GeneratorError::InvalidSpec(_))
        ));
    }
}
