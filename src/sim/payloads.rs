//! Payload builders that turn per-tick state into publish bytes.
//!
//! Builders are stateful and exclusively owned by one resolved stream.
//! File-backed builders re-read their file on every publish so rotated or
//! rewritten files are picked up without a restart.

use crate::config::model::{ByteEncoding, PayloadSpec, SequenceEncoding};
use crate::error::PayloadError;
use crate::sim::generators::ValueGenerator;
use crate::sim::rng::{derive_field_rng, SharedRng};
use crate::sim::value::Value;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};

const PREVIEW_LIMIT: usize = 48;

/// Encoded payload bytes plus a compact preview for status output.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPayload {
    pub bytes: Vec<u8>,
    pub preview: String,
}

/// Stateful payload builder, one closed variant per payload kind.
#[derive(Debug)]
pub enum PayloadBuilder {
    Text {
        value: String,
    },
    Bytes {
        bytes: Vec<u8>,
    },
    File {
        path: PathBuf,
        pickle: bool,
    },
    Sequence {
        items: Vec<Value>,
        encoding: SequenceEncoding,
        looped: bool,
        index: usize,
    },
    JsonFields {
        fields: Vec<(String, ValueGenerator)>,
    },
}

impl PayloadBuilder {
    /// Build a payload builder from a resolved (already templated) spec.
    ///
    /// Relative file paths resolve against the config file's directory.
    pub fn from_spec(
        spec: &PayloadSpec,
        config_dir: &Path,
        rng: SharedRng,
    ) -> Result<PayloadBuilder, PayloadError> {
        match spec {
            PayloadSpec::Text(text) => Ok(PayloadBuilder::Text {
                value: text.value.clone(),
            }),
            PayloadSpec::Bytes(bytes) => Ok(PayloadBuilder::Bytes {
                bytes: decode_bytes(&bytes.value, bytes.encoding)?,
            }),
            PayloadSpec::File(file) => Ok(PayloadBuilder::File {
                path: resolve_path(&file.path, config_dir),
                pickle: false,
            }),
            PayloadSpec::PickleFile(file) => Ok(PayloadBuilder::File {
                path: resolve_path(&file.path, config_dir),
                pickle: true,
            }),
            PayloadSpec::Sequence(seq) => Ok(PayloadBuilder::Sequence {
                items: seq.items.iter().map(Value::from_json).collect(),
                encoding: seq.encoding,
                looped: seq.looped,
                index: 0,
            }),
            PayloadSpec::JsonFields(spec) => {
                let mut fields = Vec::with_capacity(spec.fields.len());
                for field in &spec.fields {
                    // each field draws from its own sub-RNG, so adding or
                    // reordering fields leaves sibling sequences unchanged
                    let generator =
                        ValueGenerator::from_spec(&field.generator, derive_field_rng(&rng))?;
                    fields.push((field.name.clone(), generator));
                }
                Ok(PayloadBuilder::JsonFields { fields })
            }
        }
    }

    /// Produce the next payload.
    pub fn build(&mut self) -> Result<BuiltPayload, PayloadError> {
        match self {
            PayloadBuilder::Text { value } => Ok(BuiltPayload {
                bytes: value.as_bytes().to_vec(),
                preview: truncate_preview(value),
            }),
            PayloadBuilder::Bytes { bytes } => Ok(BuiltPayload {
                preview: format!("<bytes {}B>", bytes.len()),
                bytes: bytes.clone(),
            }),
            PayloadBuilder::File { path, pickle } => {
                let bytes = std::fs::read(&path).map_err(|source| PayloadError::Io {
                    path: path.clone(),
                    source,
                })?;
                let preview = if *pickle {
                    format!("<pickle {}B>", bytes.len())
                } else {
                    format!("<bytes {}B>", bytes.len())
                };
                Ok(BuiltPayload { bytes, preview })
            }
            PayloadBuilder::Sequence {
                items,
                encoding,
                looped,
                index,
            } => {
                if *index >= items.len() {
                    if *looped {
                        *index = 0;
                    } else {
                        *index = items.len() - 1;
                    }
                }
                let item = &items[*index];
                *index += 1;
                let rendered = match encoding {
                    SequenceEncoding::Text => item.to_string(),
                    SequenceEncoding::Json => item.to_json().to_string(),
                };
                Ok(BuiltPayload {
                    bytes: rendered.clone().into_bytes(),
                    preview: truncate_preview(&rendered),
                })
            }
            PayloadBuilder::JsonFields { fields } => {
                let mut object = serde_json::Map::with_capacity(fields.len());
                for (name, generator) in fields.iter_mut() {
                    object.insert(name.clone(), generator.next()?.to_json());
                }
                let bytes = serde_json::to_vec(&object)?;
                let preview = truncate_preview(&String::from_utf8_lossy(&bytes));
                Ok(BuiltPayload { bytes, preview })
            }
        }
    }
}

fn resolve_path(path: &str, config_dir: &Path) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        config_dir.join(candidate)
    }
}

fn decode_bytes(value: &str, encoding: ByteEncoding) -> Result<Vec<u8>, PayloadError> {
    match encoding {
        ByteEncoding::Utf8 => Ok(value.as_bytes().to_vec()),
        ByteEncoding::Hex => {
            let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
            hex::decode(&compact)
                .map_err(|err| PayloadError::Decode(format!("invalid hex payload: {err}")))
        }
        ByteEncoding::Base64 => STANDARD
            .decode(value)
            .map_err(|err| PayloadError::Decode(format!("invalid base64 payload: {err}"))),
    }
}

/// Shorten a preview string for table cells and log lines.
pub fn truncate_preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LIMIT {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_LIMIT - 3).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::rng::SimRng;
    use serde_json::json;
    use std::io::Write;

    fn builder(spec: serde_json::Value, config_dir: &Path) -> PayloadBuilder {
        let spec: PayloadSpec = serde_json::from_value(spec).unwrap();
        PayloadBuilder::from_spec(&spec, config_dir, SimRng::new(Some(42)).derive(0)).unwrap()
    }

    #[test]
    fn test_text_payload() {
        let mut b = builder(json!({"kind": "text", "value": "hello"}), Path::new("."));
        let built = b.build().unwrap();
        assert_eq!(built.bytes, b"hello");
        assert_eq!(built.preview, "hello");
    }

    #[test]
    fn test_bytes_hex_ignores_whitespace() {
        let mut b = builder(
            json!({"kind": "bytes", "value": "de ad be ef", "encoding": "hex"}),
            Path::new("."),
        );
        let built = b.build().unwrap();
        assert_eq!(built.bytes, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(built.preview, "<bytes 4B>");
        // decode-then-encode yields the canonical lowercase form
        assert_eq!(hex::encode(&built.bytes), "deadbeef");
    }

    #[test]
    fn test_bytes_base64_and_roundtrip() {
        let original = b"\x00\x01binary\xff".to_vec();
        let encoded = STANDARD.encode(&original);
        let mut b = builder(
            json!({"kind": "bytes", "value": encoded, "encoding": "base64"}),
            Path::new("."),
        );
        let built = b.build().unwrap();
        assert_eq!(built.bytes, original);
        // decode-then-encode reproduces the canonical form
        assert_eq!(STANDARD.encode(&built.bytes), encoded);
    }

    #[test]
    fn test_bytes_decode_failure() {
        let spec: PayloadSpec =
            serde_json::from_value(json!({"kind": "bytes", "value": "zz", "encoding": "hex"}))
                .unwrap();
        let err =
            PayloadBuilder::from_spec(&spec, Path::new("."), SimRng::new(None).derive(0))
                .unwrap_err();
        assert!(matches!(err, PayloadError::Decode(_)));
    }

    #[test]
    fn test_file_rereads_each_publish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::write(&path, b"first").unwrap();

        let mut b = builder(
            json!({"kind": "file", "path": "payload.bin"}),
            dir.path(),
        );
        assert_eq!(b.build().unwrap().bytes, b"first");

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"second").unwrap();
        drop(file);
        assert_eq!(b.build().unwrap().bytes, b"second");
    }

    #[test]
    fn test_pickle_file_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.pkl");
        let blob: Vec<u8> = (0..1234).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &blob).unwrap();

        let mut b = builder(
            json!({"kind": "pickle_file", "path": "state.pkl"}),
            dir.path(),
        );
        let built = b.build().unwrap();
        assert_eq!(built.bytes, blob);
        assert_eq!(built.preview, "<pickle 1234B>");
    }

    #[test]
    fn test_file_missing_is_payload_error() {
        let mut b = builder(
            json!({"kind": "file", "path": "missing.bin"}),
            Path::new("/nonexistent"),
        );
        assert!(matches!(b.build().unwrap_err(), PayloadError::Io { .. }));
    }

    #[test]
    fn test_sequence_text_and_json_encodings() {
        let mut text = builder(
            json!({"kind": "sequence", "items": ["a", 1, true], "encoding": "text"}),
            Path::new("."),
        );
        let rendered: Vec<_> = (0..3)
            .map(|_| String::from_utf8(text.build().unwrap().bytes).unwrap())
            .collect();
        assert_eq!(rendered, vec!["a", "1", "true"]);

        let mut json_enc = builder(
            json!({"kind": "sequence", "items": [{"k": 1}], "encoding": "json"}),
            Path::new("."),
        );
        assert_eq!(json_enc.build().unwrap().bytes, br#"{"k":1}"#);
    }

    #[test]
    fn test_sequence_clamps_when_not_looped() {
        let mut b = builder(
            json!({"kind": "sequence", "items": ["a", "b", "c"], "loop": false}),
            Path::new("."),
        );
        let rendered: Vec<_> = (0..5)
            .map(|_| String::from_utf8(b.build().unwrap().bytes).unwrap())
            .collect();
        assert_eq!(rendered, vec!["a", "b", "c", "c", "c"]);
    }

    #[test]
    fn test_json_fields_order_and_types() {
        let mut b = builder(
            json!({"kind": "json_fields", "fields": [
                {"name": "ok", "generator": {"kind": "bool_toggle", "start": true}},
                {"name": "n", "generator": {"kind": "const", "value": 3}},
                {"name": "label", "generator": {"kind": "const", "value": "x"}},
                {"name": "nothing", "generator": {"kind": "const", "value": null}}
            ]}),
            Path::new("."),
        );
        let first = String::from_utf8(b.build().unwrap().bytes).unwrap();
        assert_eq!(first, r#"{"ok":true,"n":3,"label":"x","nothing":null}"#);
        let second = String::from_utf8(b.build().unwrap().bytes).unwrap();
        assert_eq!(second, r#"{"ok":false,"n":3,"label":"x","nothing":null}"#);
    }

    #[test]
    fn test_sibling_fields_have_isolated_rngs() {
        let field = |name: &str| {
            json!({"name": name, "generator": {
                "kind": "number_random", "min": 0, "max": 1000000, "numeric_type": "int"
            }})
        };
        let values_of_a = |fields: serde_json::Value| {
            let mut b = builder(json!({"kind": "json_fields", "fields": fields}), Path::new("."));
            (0..5)
                .map(|_| {
                    let parsed: serde_json::Value =
                        serde_json::from_slice(&b.build().unwrap().bytes).unwrap();
                    parsed["a"].as_i64().unwrap()
                })
                .collect::<Vec<_>>()
        };
        // a second randomness-consuming field must not shift the first one's draws
        let solo = values_of_a(json!([field("a")]));
        let paired = values_of_a(json!([field("a"), field("b")]));
        assert_eq!(solo, paired);
    }

    #[test]
    fn test_preview_truncation() {
        let long = "x".repeat(100);
        let preview = truncate_preview(&long);
        assert_eq!(preview.len(), PREVIEW_LIMIT);
        assert!(preview.ends_with("..."));
        assert_eq!(truncate_preview("short"), "short");
    }
}
