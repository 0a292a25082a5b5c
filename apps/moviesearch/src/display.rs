//! Terminal rendering of [`QueryState`] for the observer task.

use serde_json::Value;
use shared::domain::{Payload, QueryState};

const SUMMARY_FIELDS: &[&str] = &["Rated", "Runtime", "Genre", "Director", "Actors", "Plot"];

/// Text to print for a state transition. `None` when nothing should be shown.
pub fn render(state: &QueryState) -> Option<String> {
    match state {
        QueryState::Idle => None,
        QueryState::Loading => Some("Loading...".to_string()),
        QueryState::Success(payload) => Some(render_payload(payload)),
        QueryState::Failure(err) => Some(match err.status {
            Some(status) => format!("Lookup failed (HTTP {status}): {}", err.message),
            None => format!("Lookup failed: {}", err.message),
        }),
    }
}

fn render_payload(payload: &Payload) -> String {
    if let Some(message) = payload.api_error() {
        return format!("No result: {message}");
    }

    let Some(title) = payload.get_str("Title") else {
        return "No movie to display".to_string();
    };

    let mut out = match payload.get_str("Year") {
        Some(year) => format!("{title} ({year})"),
        None => title.to_string(),
    };
    for field in SUMMARY_FIELDS {
        if let Some(value) = payload.get(field).and_then(field_text) {
            out.push_str(&format!("\n  {field}: {value}"));
        }
    }
    if let Some(poster) = payload.get_str("Poster").filter(|p| *p != "N/A") {
        out.push_str(&format!("\n  Poster: {poster}"));
    }
    out
}

fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() || s == "N/A" => None,
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared::error::FetchError;

    use super::*;

    fn success(value: Value) -> QueryState {
        QueryState::Success(serde_json::from_value(value).expect("payload"))
    }

    #[test]
    fn idle_renders_nothing() {
        assert_eq!(render(&QueryState::Idle), None);
        assert_eq!(render(&QueryState::Loading).as_deref(), Some("Loading..."));
    }

    #[test]
    fn renders_movie_summary() {
        let state = success(json!({
            "Title": "Dune",
            "Year": "2021",
            "Genre": "Action, Adventure, Drama",
            "Plot": "N/A",
            "Poster": "https://img.example.test/dune.jpg",
        }));
        assert_eq!(
            render(&state).expect("rendered"),
            "Dune (2021)\n  Genre: Action, Adventure, Drama\n  Poster: https://img.example.test/dune.jpg"
        );
    }

    #[test]
    fn renders_in_band_api_error() {
        let state = success(json!({ "Response": "False", "Error": "Movie not found!" }));
        assert_eq!(
            render(&state).as_deref(),
            Some("No result: Movie not found!")
        );
    }

    #[test]
    fn renders_failures_with_status() {
        let state = QueryState::Failure(FetchError::status(401, "remote service returned 401"));
        assert_eq!(
            render(&state).as_deref(),
            Some("Lookup failed (HTTP 401): remote service returned 401")
        );

        let state = QueryState::Failure(FetchError::decode("bad body"));
        assert_eq!(render(&state).as_deref(), Some("Lookup failed: bad body"));
    }

    #[test]
    fn payload_without_title_has_placeholder() {
        assert_eq!(
            render(&success(json!({ "Year": "2021" }))).as_deref(),
            Some("No movie to display")
        );
    }
}
