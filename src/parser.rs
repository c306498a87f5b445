//! Parsing of structured model output.
//!
//! Engines ask the model to answer in labelled sections (REASONING:,
//! CONCLUSION:, ...). Models do not always comply, so every section is
//! optional: missing text defaults to empty, missing lists to empty, and
//! missing confidence to 0.5. Confidence values are accepted on either a
//! 0-1 or 0-100 scale.

use std::collections::HashMap;

const MAX_LIST_ITEMS: usize = 10;

const STEP_HEADERS: [&str; 6] = [
    "REASONING:",
    "CONCLUSION:",
    "CONFIDENCE:",
    "NEXT_STEPS:",
    "DEPENDENCIES:",
    "COMPLETION_STATUS:",
];

const AGENT_HEADERS: [&str; 6] = [
    "ANALYSIS:",
    "REASONING:",
    "RECOMMENDATIONS:",
    "CONFIDENCE:",
    "DISAGREEMENTS:",
    "QUESTIONS:",
];

/// One parsed sequential-thinking step
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStep {
    pub reasoning: String,
    pub conclusion: String,
    pub confidence: f64,
    pub next_steps: Vec<String>,
    pub dependencies: Vec<String>,
    pub complete: bool,
}

/// One parsed agent contribution in a discussion round
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAgentTurn {
    pub analysis: String,
    pub reasoning: String,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub disagreements: Vec<String>,
    pub questions: Vec<String>,
}

/// Parse a sequential step response.
pub fn parse_step(text: &str) -> ParsedStep {
    let sections = split_sections(text, &STEP_HEADERS);

    let status = section_text(&sections, "COMPLETION_STATUS:");
    let status_lower = status.trim().to_lowercase();
    let complete = status_lower.starts_with("complete") || status_lower.starts_with("done");

    ParsedStep {
        reasoning: section_text(&sections, "REASONING:"),
        conclusion: section_text(&sections, "CONCLUSION:"),
        confidence: parse_confidence(sections.get("CONFIDENCE:").map(|s| s.as_str())),
        next_steps: parse_list(sections.get("NEXT_STEPS:").map(|s| s.as_str())),
        dependencies: parse_list(sections.get("DEPENDENCIES:").map(|s| s.as_str())),
        complete,
    }
}

/// Parse an agent discussion contribution.
pub fn parse_agent_turn(text: &str) -> ParsedAgentTurn {
    let sections = split_sections(text, &AGENT_HEADERS);

    ParsedAgentTurn {
        analysis: section_text(&sections, "ANALYSIS:"),
        reasoning: section_text(&sections, "REASONING:"),
        recommendations: parse_list(sections.get("RECOMMENDATIONS:").map(|s| s.as_str())),
        confidence: parse_confidence(sections.get("CONFIDENCE:").map(|s| s.as_str())),
        disagreements: parse_list(sections.get("DISAGREEMENTS:").map(|s| s.as_str())),
        questions: parse_list(sections.get("QUESTIONS:").map(|s| s.as_str())),
    }
}

/// Find a trailing CONFIDENCE: marker in free-form text.
pub fn extract_confidence(text: &str) -> Option<f64> {
    text.lines()
        .rev()
        .find_map(|line| {
            let upper = line.trim().to_uppercase();
            upper
                .strip_prefix("CONFIDENCE:")
                .map(|rest| rest.to_string())
        })
        .and_then(|rest| first_number(&rest))
        .map(normalize_confidence)
}

/// Split text into sections keyed by the headers that appear in it.
///
/// A header must start its line. Everything up to the next header (or end of
/// text) belongs to the section. Text before the first header is discarded.
fn split_sections(text: &str, headers: &[&str]) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        let matched = headers
            .iter()
            .find(|h| trimmed.to_uppercase().starts_with(**h));

        if let Some(header) = matched {
            let rest = &trimmed[header.len()..];
            current = Some((*header).to_string());
            sections.insert((*header).to_string(), rest.trim_start().to_string());
        } else if let Some(ref key) = current {
            let entry = sections.entry(key.clone()).or_default();
            if !entry.is_empty() {
                entry.push('\n');
            }
            entry.push_str(line);
        }
    }

    sections
}

fn section_text(sections: &HashMap<String, String>, header: &str) -> String {
    sections
        .get(header)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Parse a confidence value, accepting 0-1 and 0-100 scales.
fn parse_confidence(text: Option<&str>) -> f64 {
    text.and_then(first_number)
        .map(normalize_confidence)
        .unwrap_or(0.5)
}

fn normalize_confidence(value: f64) -> f64 {
    let scaled = if value > 1.0 { value / 100.0 } else { value };
    scaled.clamp(0.0, 1.0)
}

fn first_number(text: &str) -> Option<f64> {
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            if start.is_none() {
                start = Some(i);
            }
        } else if let Some(s) = start {
            return text[s..i].parse().ok();
        }
    }
    start.and_then(|s| text[s..].parse().ok())
}

/// Parse a bulleted or numbered list, capped at [`MAX_LIST_ITEMS`] items.
fn parse_list(text: Option<&str>) -> Vec<String> {
    let Some(text) = text else {
        return Vec::new();
    };

    let lower = text.trim().to_lowercase();
    if lower == "none" || lower == "n/a" || lower == "-" {
        return Vec::new();
    }

    text.lines()
        .map(strip_bullet)
        .filter(|item| !item.is_empty())
        .take(MAX_LIST_ITEMS)
        .collect()
}

fn strip_bullet(line: &str) -> String {
    let trimmed = line.trim();
    let without_marker = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .or_else(|| trimmed.strip_prefix("• "))
        .unwrap_or_else(|| {
            // Numbered markers: "1. item" / "2) item"
            let digits: usize = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
            if digits > 0 {
                let rest = &trimmed[digits..];
                rest.strip_prefix(". ")
                    .or_else(|| rest.strip_prefix(") "))
                    .unwrap_or(trimmed)
            } else {
                trimmed
            }
        });
    without_marker.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_full_step() {
        let text = "\
REASONING: The water damage is confined to the kitchen.
The subfloor needs inspection.
CONCLUSION: Kitchen requires partial floor replacement.
CONFIDENCE: 0.85
NEXT_STEPS:
- Inspect subfloor moisture levels
- Obtain replacement quotes
DEPENDENCIES:
- Moisture meter readings
COMPLETION_STATUS: incomplete";

        let step = parse_step(text);
        assert!(step.reasoning.contains("subfloor needs inspection"));
        assert_eq!(step.conclusion, "Kitchen requires partial floor replacement.");
        assert_eq!(step.confidence, 0.85);
        assert_eq!(
            step.next_steps,
            vec![
                "Inspect subfloor moisture levels".to_string(),
                "Obtain replacement quotes".to_string()
            ]
        );
        assert_eq!(step.dependencies, vec!["Moisture meter readings".to_string()]);
        assert!(!step.complete);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let step = parse_step("just some unstructured rambling");
        assert_eq!(step.reasoning, "");
        assert_eq!(step.conclusion, "");
        assert_eq!(step.confidence, 0.5);
        assert!(step.next_steps.is_empty());
        assert!(!step.complete);
    }

    #[test]
    fn test_completion_status_variants() {
        assert!(parse_step("COMPLETION_STATUS: COMPLETE").complete);
        assert!(parse_step("COMPLETION_STATUS: complete - no further work").complete);
        assert!(!parse_step("COMPLETION_STATUS: incomplete").complete);
    }

    #[test]
    fn test_confidence_scales() {
        assert_eq!(parse_step("CONFIDENCE: 0.9").confidence, 0.9);
        assert_eq!(parse_step("CONFIDENCE: 90").confidence, 0.9);
        assert_eq!(parse_step("CONFIDENCE: 90%").confidence, 0.9);
        assert_eq!(parse_step("CONFIDENCE: around 75 percent").confidence, 0.75);
        // Values beyond both scales clamp
        assert_eq!(parse_step("CONFIDENCE: 250").confidence, 1.0);
    }

    #[test]
    fn test_parse_agent_turn() {
        let text = "\
ANALYSIS: Structural integrity is sound but electrics are compromised.
REASONING: Water reached the wall outlets.
RECOMMENDATIONS:
1. Isolate power to affected circuits
2. Engage a licensed electrician
CONFIDENCE: 80
DISAGREEMENTS:
- Cost estimate from previous round looks low
QUESTIONS: none";

        let turn = parse_agent_turn(text);
        assert!(turn.analysis.contains("electrics are compromised"));
        assert_eq!(turn.recommendations.len(), 2);
        assert_eq!(turn.recommendations[0], "Isolate power to affected circuits");
        assert_eq!(turn.confidence, 0.8);
        assert_eq!(turn.disagreements.len(), 1);
        assert!(turn.questions.is_empty());
    }

    #[test]
    fn test_list_caps_items() {
        let items: Vec<String> = (0..20).map(|i| format!("- item {}", i)).collect();
        let text = format!("NEXT_STEPS:\n{}", items.join("\n"));
        let step = parse_step(&text);
        assert_eq!(step.next_steps.len(), 10);
    }

    #[test]
    fn test_extract_confidence_from_free_text() {
        let text = "The roof is stable.\n\nCONFIDENCE: 0.72";
        assert_eq!(extract_confidence(text), Some(0.72));
        assert_eq!(extract_confidence("no marker here"), None);
    }

    #[test]
    fn test_case_insensitive_headers() {
        let step = parse_step("conclusion: all good\nconfidence: 1.0");
        assert_eq!(step.conclusion, "all good");
        assert_eq!(step.confidence, 1.0);
    }
}
