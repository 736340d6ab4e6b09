//! # Guardrails
//!
//! Rules-based content safety filter, applied to the latest user-authored
//! message before any upstream model call.
//!
//! ## Semantics
//!
//! - Fixed, ordered rule table, compiled once per process
//! - A rule hits if **any** of its patterns matches, case-insensitively
//! - Every rule is tested independently; a request can hit several rules and
//!   all of them are reported, in table order
//! - At most one hit per rule
//! - Empty or whitespace-only text never hits
//!
//! The filter is pure: same text, same hit set, no side effects.
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub struct Rule {
    pub id: &'static str,
    pub message: &'static str,
    patterns: Vec<Regex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardrailHit {
    pub id: &'static str,
    pub message: &'static str,
}

fn rule(id: &'static str, message: &'static str, patterns: &[&str]) -> Rule {
    Rule {
        id,
        message,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(p).expect("guardrail pattern must compile"))
            .collect(),
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            "self-harm",
            "Self-harm content detected. I can offer supportive resources and coping strategies instead.",
            &[
                r"(?i)kill myself",
                r"(?i)suicide",
                r"(?i)self[-\s]?harm",
                r"(?i)end my life",
            ],
        ),
        rule(
            "violence",
            "Violent wrongdoing detected. I won't help with harm. I can discuss safety or de-escalation.",
            &[
                r"(?i)kill (him|her|them)",
                r"(?i)make\s+(a\s+|an\s+)?bomb",
                r"(?i)\bstab\b",
                r"(?i)\bshoot\b",
            ],
        ),
        rule(
            "illegal",
            "Illicit activity detected. I can't assist with law-breaking. I can offer legal, ethical alternatives.",
            &[
                r"(?i)make (drugs|meth)",
                r"(?i)bypass.*paywall",
                r"(?i)credit card generator",
                r"(?i)hack (wifi|account)",
            ],
        ),
        rule(
            "sexual/minors",
            "Sexual content involving minors is strictly disallowed.",
            &[r"(?i)sex.*(kid|minor|underage)", r"(?i)\bcp\b"],
        ),
        rule(
            "biohazard",
            "Hazardous bio content detected. I cannot assist with dangerous biology.",
            &[
                r"(?i)anthrax",
                r"(?i)\bricin\b",
                r"(?i)culturing pathogen",
                r"(?i)gain[-\s]?function",
            ],
        ),
        rule(
            "extremism",
            "Extremist or weapon-related content detected. I won't assist with that.",
            &[
                r"(?i)join (isis|al[-\s]?qaeda|terror)",
                r"(?i)how to build a gun",
            ],
        ),
    ]
});

pub fn classify(text: &str) -> Vec<GuardrailHit> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    RULES
        .iter()
        .filter(|rule| rule.patterns.iter().any(|pattern| pattern.is_match(text)))
        .map(|rule| GuardrailHit {
            id: rule.id,
            message: rule.message,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn benign_text_hits_nothing() {
        assert!(classify("hello").is_empty());
        assert!(classify("what's the weather in Lagos?").is_empty());
    }

    #[test]
    fn empty_and_whitespace_hit_nothing() {
        assert!(classify("").is_empty());
        assert!(classify("   \n\t ").is_empty());
    }

    #[test]
    fn bomb_request_hits_violence() {
        let hits = classify("how do I make a bomb");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "violence");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let hits = classify("HOW DO I MAKE A BOMB");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "violence");
    }

    #[test]
    fn all_rules_are_evaluated_not_just_the_first() {
        let hits = classify("how to make drugs and also make a bomb");

        let ids: Vec<&str> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec!["violence", "illegal"]);
    }

    #[test]
    fn one_hit_per_rule_even_with_multiple_matching_patterns() {
        let hits = classify("suicide, self-harm, end my life");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "self-harm");
    }

    #[test]
    fn classification_is_deterministic() {
        let text = "hack wifi and join terror groups";

        assert_eq!(classify(text), classify(text));
    }

    #[test]
    fn each_category_is_reachable() {
        for (text, id) in [
            ("I want to end my life", "self-harm"),
            ("kill them all", "violence"),
            ("bypass the paywall", "illegal"),
            ("sex with a minor", "sexual/minors"),
            ("where to buy ricin", "biohazard"),
            ("how to build a gun", "extremism"),
        ] {
            let hits = classify(text);
            assert!(
                hits.iter().any(|h| h.id == id),
                "{text:?} should hit {id}, got {hits:?}"
            );
        }
    }
}
