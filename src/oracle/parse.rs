//! Parsing of structured grading responses.

use serde_json::Value;

use super::{Evaluation, OracleError};

/// Strip an optional fenced-code wrapper (with or without a language tag)
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Skip the info string of the opening fence, e.g. "json"
        text = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

/// Parse `{"grade": number, "justification": string}`.
///
/// Accepted only when `grade` is a non-negative number and `justification` is
/// a non-blank string.
pub fn parse_evaluation(raw: &str) -> Result<Evaluation, OracleError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(OracleError::EmptyPayload);
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| OracleError::Parse(format!("not valid JSON ({}): {}", e, preview(body))))?;

    let object = value
        .as_object()
        .ok_or_else(|| OracleError::Parse(format!("expected a JSON object: {}", preview(body))))?;

    let grade = object
        .get("grade")
        .and_then(Value::as_f64)
        .ok_or_else(|| OracleError::Parse("missing or non-numeric 'grade'".to_string()))?;

    // Negative grades would collide with the failure sentinel
    if grade < 0.0 {
        return Err(OracleError::Parse(format!("grade {} is below the rubric scale", grade)));
    }

    let justification = object
        .get("justification")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|j| !j.is_empty())
        .ok_or_else(|| OracleError::Parse("missing or empty 'justification'".to_string()))?;

    Ok(Evaluation {
        grade,
        justification: justification.to_string(),
    })
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_and_plain_parse_identically() {
        let plain = r#"{"grade": 5, "justification": "polite"}"#;
        let fenced = format!("```json\n{}\n```", plain);
        let bare_fence = format!("```\n{}\n```", plain);

        let expected = parse_evaluation(plain).unwrap();
        assert_eq!(parse_evaluation(&fenced).unwrap(), expected);
        assert_eq!(parse_evaluation(&bare_fence).unwrap(), expected);
        assert_eq!(expected.grade, 5.0);
        assert_eq!(expected.justification, "polite");
    }

    #[test]
    fn test_missing_justification_is_parse_error() {
        let err = parse_evaluation(r#"{"grade": 3}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));

        let err = parse_evaluation(r#"{"grade": 3, "justification": "  "}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[test]
    fn test_non_numeric_grade_is_parse_error() {
        let err = parse_evaluation(r#"{"grade": "5", "justification": "x"}"#).unwrap_err();
        assert_eq!(
            err,
            OracleError::Parse("missing or non-numeric 'grade'".to_string())
        );
    }

    #[test]
    fn test_sentinel_grade_is_parse_error() {
        let err = parse_evaluation(r#"{"grade": -1, "justification": "terrible"}"#).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
        assert!(err.to_string().contains("below the rubric scale"));

        assert!(parse_evaluation(r#"{"grade": 0, "justification": "none"}"#).is_ok());
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            parse_evaluation("I'd give it a 5."),
            Err(OracleError::Parse(_))
        ));
        assert!(matches!(
            parse_evaluation("[5, \"ok\"]"),
            Err(OracleError::Parse(_))
        ));
        assert_eq!(parse_evaluation("```json\n```"), Err(OracleError::EmptyPayload));
    }

    #[test]
    fn test_justification_is_trimmed() {
        let eval = parse_evaluation("{\"grade\": 1.0, \"justification\": \" rude \"}").unwrap();
        assert_eq!(eval.grade, 1.0);
        assert_eq!(eval.justification, "rude");
    }
}
