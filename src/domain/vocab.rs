//! Normalisation of human-written configuration values.
//!
//! Scenario files and CLI flags use prose ("Fork Length", "QueenslandA",
//! "enabled"); the engine works with dataset codes (`fl`, `qld`, `true`).

use crate::error::{GrowthError, Result};

const LOCATIONS: &[(&str, &str)] = &[
    ("NewSouthWalesA", "nsw1"),
    ("NewSouthWalesB", "nsw2"),
    ("QueenslandA", "qld"),
    ("QueenslandB", "qld2"),
];

const VARIABLES: &[(&str, &str)] = &[
    ("total_length", "stl"),
    ("fork_length", "fl"),
    ("age", "age"),
];

/// `" Fork Length "` -> `"fork_length"`.
pub fn snake_case(text: &str) -> String {
    text.trim()
        .replace([' ', '.', '-'], "_")
        .to_lowercase()
}

/// `"a, b, and c"` -> `["a", "b", "c"]`.
pub fn parse_comma_list(text: &str) -> Vec<String> {
    text.replace(", and", ",")
        .replace(' ', "")
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_enabled_disabled(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "enabled" => Ok(true),
        "disabled" => Ok(false),
        other => Err(GrowthError::config(format!(
            "expected `enabled` or `disabled`, got `{other}`"
        ))),
    }
}

/// Dataset code for a sampling location name, if known.
pub fn location_code(name: &str) -> Option<&'static str> {
    LOCATIONS
        .iter()
        .find(|(long, _)| *long == name.trim())
        .map(|(_, code)| *code)
}

/// Resolve a list of location names; unknown names are a configuration error.
pub fn location_codes(names: &[String]) -> Result<Vec<String>> {
    names
        .iter()
        .map(|name| {
            location_code(name)
                .map(str::to_string)
                .ok_or_else(|| GrowthError::config(format!("unknown location `{name}`")))
        })
        .collect()
}

/// Dataset column for a measured variable (`"Fork Length"` -> `"fl"`).
pub fn variable_column(name: &str) -> Option<&'static str> {
    let key = snake_case(name);
    VARIABLES
        .iter()
        .find(|(long, _)| *long == key)
        .map(|(_, column)| *column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snake_case_normalises_separators() {
        assert_eq!(snake_case("  Carcharhinus limbatus "), "carcharhinus_limbatus");
        assert_eq!(snake_case("Von-Bertalanffy.Model"), "von_bertalanffy_model");
    }

    #[test]
    fn comma_list_handles_oxford_and() {
        assert_eq!(
            parse_comma_list("QueenslandA, QueenslandB, and NewSouthWalesA"),
            vec!["QueenslandA", "QueenslandB", "NewSouthWalesA"]
        );
    }

    #[test]
    fn lookups_resolve_known_names() {
        assert_eq!(location_code("QueenslandB"), Some("qld2"));
        assert_eq!(variable_column("Fork Length"), Some("fl"));
        assert_eq!(variable_column("girth"), None);
        assert!(location_codes(&["Tasmania".to_string()]).is_err());
    }

    #[test]
    fn enabled_disabled_parses() {
        assert!(parse_enabled_disabled("Enabled").unwrap());
        assert!(!parse_enabled_disabled("disabled").unwrap());
        assert!(parse_enabled_disabled("maybe").is_err());
    }
}
