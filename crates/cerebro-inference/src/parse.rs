//! Strict parsing of the model's classification response.
//!
//! The response must be exactly one JSON object with `category`,
//! `confidence` and `extracted`. Nothing is guessed: prose, markdown
//! fences, unknown categories and shape mismatches are all parse failures.

use serde_json::Value as JsonValue;
use tracing::warn;

use cerebro_core::{Category, ClassificationError, ClassificationResult, ExtractedFields};

/// Clamp a model-reported confidence into `[0, 1]`.
///
/// Out-of-range values are pulled to the nearest bound and NaN becomes 0.
/// Either case is logged as anomalous model output.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        warn!(
            subsystem = "inference",
            component = "parse",
            op = "clamp_confidence",
            "Model returned NaN confidence; using 0.0"
        );
        return 0.0;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        warn!(
            subsystem = "inference",
            component = "parse",
            op = "clamp_confidence",
            confidence = value,
            clamped,
            "Model confidence out of range; clamped"
        );
    }
    clamped
}

/// Parse a raw model response into a validated [`ClassificationResult`].
pub fn parse_classification(
    raw: &str,
    model: Option<&str>,
) -> Result<ClassificationResult, ClassificationError> {
    let attach = |err: ClassificationError| match model {
        Some(m) => err.with_model(m),
        None => err,
    };

    let value: JsonValue = serde_json::from_str(raw.trim()).map_err(|e| {
        attach(ClassificationError::parse_failure(
            format!("response is not valid JSON: {}", e),
            raw,
        ))
    })?;

    let object = value.as_object().ok_or_else(|| {
        attach(ClassificationError::parse_failure(
            "response is not a JSON object",
            raw,
        ))
    })?;

    let category: Category = match object.get("category") {
        Some(JsonValue::String(s)) => s
            .parse()
            .map_err(|e: String| attach(ClassificationError::parse_failure(e, raw)))?,
        Some(_) => {
            return Err(attach(ClassificationError::parse_failure(
                "category is not a string",
                raw,
            )))
        }
        None => {
            return Err(attach(ClassificationError::parse_failure(
                "missing category",
                raw,
            )))
        }
    };

    let confidence = match object.get("confidence") {
        Some(JsonValue::Number(n)) => n.as_f64().ok_or_else(|| {
            attach(ClassificationError::parse_failure(
                "confidence is not representable as a float",
                raw,
            ))
        })?,
        Some(_) => {
            return Err(attach(ClassificationError::parse_failure(
                "confidence is not a number",
                raw,
            )))
        }
        None => {
            return Err(attach(ClassificationError::parse_failure(
                "missing confidence",
                raw,
            )))
        }
    };

    let extracted_value = object.get("extracted").ok_or_else(|| {
        attach(ClassificationError::parse_failure(
            "missing extracted fields",
            raw,
        ))
    })?;
    let extracted = ExtractedFields::from_value(category, extracted_value)
        .map_err(|e| attach(ClassificationError::parse_failure(e, raw)))?;
    extracted
        .validate()
        .map_err(|e| attach(ClassificationError::validation_failure(e, raw)))?;

    Ok(ClassificationResult {
        confidence: clamp_confidence(confidence),
        extracted,
        raw_response: raw.to_string(),
        model: model.map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cerebro_core::{ClassificationErrorKind, ProjectStatus};

    #[test]
    fn test_parse_task() {
        let raw = r#"{"category": "task", "confidence": 0.95, "extracted": {"name": "Buy milk", "due_date": null, "notes": ""}}"#;
        let result = parse_classification(raw, Some("openai/gpt-4o-mini")).unwrap();

        assert_eq!(result.category(), Category::Task);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.extracted.primary_label(), "Buy milk");
        assert_eq!(result.raw_response, raw);
        assert_eq!(result.model.as_deref(), Some("openai/gpt-4o-mini"));
    }

    #[test]
    fn test_parse_project_defaults_status() {
        let raw = r#"{"category": "project", "confidence": 0.8, "extracted": {"name": "Website", "next_action": "Draft copy"}}"#;
        let result = parse_classification(raw, None).unwrap();
        match result.extracted {
            ExtractedFields::Project(p) => {
                assert_eq!(p.status, ProjectStatus::Active);
                assert_eq!(p.next_action, "Draft copy");
            }
            other => panic!("Expected project, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_surrounding_whitespace_allowed() {
        let raw = "\n  {\"category\": \"idea\", \"confidence\": 0.7, \"extracted\": {\"title\": \"X\"}}  \n";
        assert!(parse_classification(raw, None).is_ok());
    }

    #[test]
    fn test_non_json_is_parse_failure() {
        let raw = "Sorry, I cannot classify this.";
        let err = parse_classification(raw, Some("m")).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);
        assert_eq!(err.raw_response.as_deref(), Some(raw));
        assert_eq!(err.model.as_deref(), Some("m"));
    }

    #[test]
    fn test_markdown_fence_is_parse_failure() {
        let raw = "```json\n{\"category\": \"task\", \"confidence\": 0.9, \"extracted\": {\"name\": \"x\"}}\n```";
        let err = parse_classification(raw, None).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);
    }

    #[test]
    fn test_top_level_array_is_parse_failure() {
        let err = parse_classification("[1, 2]", None).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);
    }

    #[test]
    fn test_unknown_category_is_parse_failure() {
        let raw = r#"{"category": "reminder", "confidence": 0.9, "extracted": {"name": "x"}}"#;
        let err = parse_classification(raw, None).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);
        assert!(err.message.contains("reminder"));
    }

    #[test]
    fn test_missing_fields_are_parse_failures() {
        for raw in [
            r#"{"confidence": 0.9, "extracted": {"name": "x"}}"#,
            r#"{"category": "task", "extracted": {"name": "x"}}"#,
            r#"{"category": "task", "confidence": 0.9}"#,
            r#"{"category": "task", "confidence": "high", "extracted": {"name": "x"}}"#,
            r#"{"category": 3, "confidence": 0.9, "extracted": {"name": "x"}}"#,
        ] {
            let err = parse_classification(raw, None).unwrap_err();
            assert_eq!(err.kind, ClassificationErrorKind::ParseFailure, "{}", raw);
        }
    }

    #[test]
    fn test_shape_mismatch_is_parse_failure() {
        // follow_ups must be a list
        let raw = r#"{"category": "person", "confidence": 0.9, "extracted": {"name": "Mike", "follow_ups": "call him"}}"#;
        let err = parse_classification(raw, None).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);

        let raw = r#"{"category": "task", "confidence": 0.9, "extracted": "Buy milk"}"#;
        let err = parse_classification(raw, None).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);
    }

    #[test]
    fn test_invalid_due_date_is_parse_failure() {
        let raw = r#"{"category": "task", "confidence": 0.9, "extracted": {"name": "Pay rent", "due_date": "next Friday"}}"#;
        let err = parse_classification(raw, None).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ParseFailure);
    }

    #[test]
    fn test_empty_name_is_validation_failure() {
        let raw = r#"{"category": "person", "confidence": 0.9, "extracted": {"name": "  ", "context": "met at conf"}}"#;
        let err = parse_classification(raw, None).unwrap_err();
        assert_eq!(err.kind, ClassificationErrorKind::ValidationFailure);
        assert!(err.message.contains("person.name"));
    }

    #[test]
    fn test_confidence_clamped_high_and_low() {
        let high = r#"{"category": "task", "confidence": 1.7, "extracted": {"name": "x"}}"#;
        let low = r#"{"category": "task", "confidence": -0.2, "extracted": {"name": "x"}}"#;
        assert_eq!(parse_classification(high, None).unwrap().confidence, 1.0);
        assert_eq!(parse_classification(low, None).unwrap().confidence, 0.0);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(0.5), 0.5);
        assert_eq!(clamp_confidence(0.0), 0.0);
        assert_eq!(clamp_confidence(1.0), 1.0);
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(f64::INFINITY), 1.0);
    }
}
