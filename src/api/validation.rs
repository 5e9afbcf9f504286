use std::collections::HashMap;

use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::services::attempt_workflow::AnswerSelections;

/// Rejects malformed identifiers before any persistence call.
pub(crate) fn parse_id(field: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::BadRequest(format!("{field} must be a valid UUID")))
}

pub(crate) fn parse_optional_id(field: &str, raw: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => parse_id(field, value).map(Some),
        None => Ok(None),
    }
}

pub(crate) fn parse_selections(
    raw: &HashMap<String, Vec<String>>,
) -> Result<AnswerSelections, ApiError> {
    let mut selections = AnswerSelections::with_capacity(raw.len());

    for (question_id, answer_ids) in raw {
        let question_id = parse_id("question id", question_id)?;
        let answer_ids = answer_ids
            .iter()
            .map(|answer_id| parse_id("answer id", answer_id))
            .collect::<Result<Vec<_>, _>>()?;
        selections.insert(question_id, answer_ids);
    }

    Ok(selections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_uuid_and_rejects_garbage() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id("test_id", &id.to_string()).expect("uuid"), id);
        assert!(matches!(parse_id("test_id", "42"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn optional_id_treats_blank_as_absent() {
        assert_eq!(parse_optional_id("attempt_id", None).expect("none"), None);
        assert_eq!(parse_optional_id("attempt_id", Some("  ")).expect("blank"), None);
        assert!(parse_optional_id("attempt_id", Some("nope")).is_err());
    }

    #[test]
    fn selections_are_parsed_per_question() {
        let question = Uuid::new_v4();
        let answer = Uuid::new_v4();
        let raw = HashMap::from([
            (question.to_string(), vec![answer.to_string()]),
            (Uuid::new_v4().to_string(), Vec::new()),
        ]);

        let parsed = parse_selections(&raw).expect("selections");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&question], vec![answer]);

        let broken = HashMap::from([(question.to_string(), vec!["x".to_string()])]);
        assert!(parse_selections(&broken).is_err());
    }
}
