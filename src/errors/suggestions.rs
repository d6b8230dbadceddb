//! "Did you mean?" suggestions using fuzzy string matching
//!
//! Uses the Jaro-Winkler similarity to point at the closest known name.

use strsim::jaro_winkler;

/// Default similarity threshold for suggestions (0.0 to 1.0)
const DEFAULT_THRESHOLD: f64 = 0.6;

/// Find the most similar string from a list of candidates
///
/// Returns the best match if it exceeds the threshold, or None otherwise.
pub fn find_similar<'a>(input: &str, candidates: &[&'a str], threshold: f64) -> Option<&'a str> {
    candidates
        .iter()
        .map(|c| (jaro_winkler(input, c), *c))
        .filter(|(score, _)| *score > threshold)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, name)| name)
}

fn suggest_from(kind: &str, unknown: &str, known: &[&str]) -> String {
    if let Some(suggestion) = find_similar(unknown, known, DEFAULT_THRESHOLD) {
        format!(
            "Did you mean '{}'?\n\nAvailable {}s: {}",
            suggestion,
            kind,
            known.join(", ")
        )
    } else {
        format!(
            "Unknown {} '{}'.\n\nAvailable {}s: {}",
            kind,
            unknown,
            kind,
            known.join(", ")
        )
    }
}

/// Suggestion for an unknown include/exclude component
pub fn suggest_component(unknown: &str, known: &[&str]) -> String {
    suggest_from("component", unknown, known)
}

/// Suggestion for a target that could not be found
pub fn suggest_target(target: &str) -> String {
    if target.contains(std::path::MAIN_SEPARATOR) || target.contains('/') {
        format!(
            "Check that '{}' exists and is executable:\n  ls -la {}",
            target, target
        )
    } else {
        format!(
            "'{}' was not found on PATH.\n\nPass an absolute path to the runtime, e.g. ./target/release/{}",
            target, target
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_close_match() {
        let known = ["fuzz", "load"];
        assert_eq!(find_similar("fuz", &known, DEFAULT_THRESHOLD), Some("fuzz"));
        assert_eq!(find_similar("laod", &known, DEFAULT_THRESHOLD), Some("load"));
        assert_eq!(find_similar("zzzzzz", &known, DEFAULT_THRESHOLD), None);
    }

    #[test]
    fn component_suggestion_mentions_match() {
        let text = suggest_component("fuzzz", &["fuzz", "load"]);
        assert!(text.contains("Did you mean 'fuzz'?"));
        assert!(text.contains("fuzz, load"));
    }

    #[test]
    fn component_suggestion_without_match_lists_all() {
        let text = suggest_component("xyz", &["fuzz", "load"]);
        assert!(text.starts_with("Unknown component 'xyz'"));
        assert!(text.contains("fuzz, load"));
    }

    #[test]
    fn target_suggestion_depends_on_shape() {
        assert!(suggest_target("./bin/lang").contains("ls -la"));
        assert!(suggest_target("lang").contains("PATH"));
    }
}
