//! Structured-info analysis: one hosted-model call, strict schema parse.
//!
//! The reply must contain a JSON object. It may be wrapped in a code fence
//! or surrounded by prose; the first `{…}` value is taken. Only schema
//! fields are read from it:
//!
//! | Reply value      | Record value                     |
//! |------------------|----------------------------------|
//! | string           | trimmed; empty becomes null      |
//! | null / missing   | null                             |
//! | number / boolean | its JSON text                    |
//! | array / object   | null, plus a `FieldRejected`     |
//!
//! Any failure (call error, timeout, no JSON object) leaves the all-null
//! record and an `AnalysisFailed` warning. Nothing is retried.

use super::encode;
use super::normalize::strip_code_fence;
use crate::engine::{HostedModel, ModelRequest};
use crate::error::StageError;
use crate::output::{AnalysisSource, AnalysisStatus};
use crate::prompts;
use crate::schema::{FieldSchema, StructuredRecord};
use image::DynamicImage;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Result of an analysis call.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub record: StructuredRecord,
    pub status: AnalysisStatus,
    pub warnings: Vec<StageError>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl AnalysisOutcome {
    /// All-null record plus one `AnalysisFailed` warning.
    pub fn failed(schema: &FieldSchema, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            record: schema.empty_record(),
            status: AnalysisStatus::Failed {
                reason: reason.clone(),
            },
            warnings: vec![StageError::AnalysisFailed { detail: reason }],
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// Ask the model for the schema fields found in `text`.
pub async fn analyze_text(
    text: &str,
    schema: &FieldSchema,
    model: &dyn HostedModel,
    system_prompt: Option<&str>,
    max_prompt_chars: usize,
) -> AnalysisOutcome {
    let request = ModelRequest::new(
        system_prompt.unwrap_or(prompts::DEFAULT_SYSTEM_PROMPT),
        prompts::analysis_prompt(schema, text, max_prompt_chars),
    );
    match run(request, schema, model, AnalysisSource::Text).await {
        Ok(outcome) => outcome,
        Err(reason) => {
            warn!("Analysis failed: {}", reason);
            AnalysisOutcome::failed(schema, reason)
        }
    }
}

/// Ask a vision-capable model for the schema fields visible in `image`.
///
/// # Errors
/// [`StageError::VisionFallbackFailed`] when the call fails or the reply
/// holds no JSON object.
pub async fn analyze_image(
    image: &DynamicImage,
    schema: &FieldSchema,
    model: &dyn HostedModel,
    system_prompt: Option<&str>,
    max_pixels: u32,
) -> Result<AnalysisOutcome, StageError> {
    let data = encode::encode_for_model(image, max_pixels).map_err(|e| {
        StageError::VisionFallbackFailed {
            detail: format!("image encode: {e}"),
        }
    })?;
    let request = ModelRequest::new(
        system_prompt.unwrap_or(prompts::DEFAULT_SYSTEM_PROMPT),
        prompts::vision_analysis_prompt(schema),
    )
    .with_image(data);

    run(request, schema, model, AnalysisSource::Vision)
        .await
        .map_err(|detail| StageError::VisionFallbackFailed { detail })
}

async fn run(
    request: ModelRequest,
    schema: &FieldSchema,
    model: &dyn HostedModel,
    source: AnalysisSource,
) -> Result<AnalysisOutcome, String> {
    let reply = model.complete(request).await.map_err(|e| e.to_string())?;
    debug!("{}: {} chars reply", model.name(), reply.content.len());

    let (record, warnings) = parse_reply(&reply.content, schema)?;
    info!(
        "Analysis ({:?}) found {}/{} fields",
        source,
        record.filled(),
        record.len()
    );

    Ok(AnalysisOutcome {
        record,
        status: AnalysisStatus::Analyzed {
            source,
            model: model.name().to_string(),
        },
        warnings,
        input_tokens: reply.input_tokens,
        output_tokens: reply.output_tokens,
    })
}

/// Parse a model reply into a record for `schema`.
///
/// Returns the record and one `FieldRejected` per unusable field value;
/// `Err` when the reply holds no JSON object.
pub fn parse_reply(
    reply: &str,
    schema: &FieldSchema,
) -> Result<(StructuredRecord, Vec<StageError>), String> {
    let object = json_object(reply).ok_or_else(|| {
        format!(
            "reply is not a JSON object: {:?}",
            reply.chars().take(80).collect::<String>()
        )
    })?;

    let mut record = schema.empty_record();
    let mut warnings = Vec::new();

    for name in schema.names() {
        let value = match object.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
            Some(v) => {
                warnings.push(StageError::FieldRejected {
                    field: name.to_string(),
                    detail: format!("expected a string, got {}", json_kind(v)),
                });
                None
            }
        };
        record.set(name, value);
    }

    let unknown = object.keys().filter(|k| !schema.contains(k)).count();
    if unknown > 0 {
        debug!("Ignored {} key(s) outside the schema", unknown);
    }

    Ok((record, warnings))
}

/// The reply itself as a JSON object, or the first `{…}` inside it that
/// parses as one.
fn json_object(reply: &str) -> Option<Map<String, Value>> {
    let body = strip_code_fence(reply);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
        return Some(map);
    }

    body.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ModelReply;
    use crate::error::EngineError;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    fn schema() -> FieldSchema {
        FieldSchema::from_names(["name", "id_number"]).unwrap()
    }

    #[test]
    fn exact_reply_maps_to_record() {
        let (record, warnings) =
            parse_reply(r#"{"name":"Jane Doe","id_number":null}"#, &schema()).unwrap();
        assert_eq!(record.get("name"), Some("Jane Doe"));
        assert_eq!(record.get("id_number"), None);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["name", "id_number"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn fenced_and_embedded_objects() {
        let (record, _) =
            parse_reply("```json\n{\"name\": \" Jane \"}\n```", &schema()).unwrap();
        assert_eq!(record.get("name"), Some("Jane"));

        let (record, _) = parse_reply(
            "Sure! Here is the data: {\"id_number\": 12345} Hope this helps {x}",
            &schema(),
        )
        .unwrap();
        assert_eq!(record.get("id_number"), Some("12345"));
        assert_eq!(record.get("name"), None);
    }

    #[test]
    fn braces_before_the_object_are_skipped() {
        let (record, _) = parse_reply(
            r#"Fields {name, id_number}: {"name": "Jane"}"#,
            &schema(),
        )
        .unwrap();
        assert_eq!(record.get("name"), Some("Jane"));
    }

    #[test]
    fn unknown_keys_ignored_and_bad_values_rejected() {
        let (record, warnings) = parse_reply(
            r#"{"name": ["Jane", "Doe"], "id_number": "", "favourite_colour": "blue"}"#,
            &schema(),
        )
        .unwrap();
        assert!(record.is_all_null());
        assert!(!record.contains_key("favourite_colour"));
        assert_eq!(
            warnings,
            vec![StageError::FieldRejected {
                field: "name".into(),
                detail: "expected a string, got array".into()
            }]
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_reply("I could not find any personal information.", &schema()).is_err());
        assert!(parse_reply("[1, 2, 3]", &schema()).is_err());
        assert!(parse_reply("", &schema()).is_err());
    }

    struct FakeModel {
        reply: Result<String, EngineError>,
        prompts: Mutex<Vec<ModelRequest>>,
    }

    impl FakeModel {
        fn new(reply: Result<String, EngineError>) -> Self {
            Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl HostedModel for FakeModel {
        fn name(&self) -> &str {
            "fake/model"
        }

        fn complete(&self, request: ModelRequest) -> BoxFuture<'_, Result<ModelReply, EngineError>> {
            self.prompts.lock().unwrap().push(request);
            let reply = self.reply.clone().map(|content| ModelReply {
                content,
                input_tokens: 100,
                output_tokens: 20,
            });
            Box::pin(async move { reply })
        }
    }

    #[tokio::test]
    async fn analyze_text_success() {
        let model = FakeModel::new(Ok(r#"{"name":"Jane Doe","id_number":"X1"}"#.into()));
        let out = analyze_text("NAME JANE DOE", &schema(), &model, None, 1000).await;
        assert_eq!(out.record.filled(), 2);
        assert_eq!(
            out.status,
            AnalysisStatus::Analyzed {
                source: AnalysisSource::Text,
                model: "fake/model".into()
            }
        );
        assert_eq!(out.input_tokens, 100);

        let sent = model.prompts.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].prompt.contains("NAME JANE DOE"));
        assert!(sent[0].images.is_empty());
    }

    #[tokio::test]
    async fn analyze_text_failure_keeps_key_set() {
        let model = FakeModel::new(Err(EngineError::Timeout {
            engine: "fake/model".into(),
            secs: 60,
        }));
        let out = analyze_text("text", &schema(), &model, Some("custom"), 1000).await;
        assert!(out.record.is_all_null());
        assert_eq!(out.record.len(), 2);
        assert!(matches!(out.status, AnalysisStatus::Failed { .. }));
        assert!(matches!(out.warnings[0], StageError::AnalysisFailed { .. }));
        assert_eq!(model.prompts.lock().unwrap()[0].system, "custom");
    }

    #[tokio::test]
    async fn analyze_image_attaches_page() {
        let model = FakeModel::new(Ok(r#"{"name":"Jane"}"#.into()));
        let img = DynamicImage::new_rgb8(4, 4);
        let out = analyze_image(&img, &schema(), &model, None, 2000)
            .await
            .unwrap();
        assert_eq!(out.record.get("name"), Some("Jane"));
        assert_eq!(model.prompts.lock().unwrap()[0].images.len(), 1);

        let bad = FakeModel::new(Ok("no idea".into()));
        let err = analyze_image(&img, &schema(), &bad, None, 2000)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::VisionFallbackFailed { .. }));
    }
}
