//! Pattern-based memory extraction from assistant text, with surprise
//! scoring against recently stored memories.

use std::sync::LazyLock;

use regex::Regex;

use switchboard_common::types::memory::MemoryType;

/// A memory candidate before surprise filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub memory_type: MemoryType,
    pub content: String,
}

struct Extractor {
    memory_type: MemoryType,
    regex: &'static LazyLock<Regex>,
    /// How the capture groups become the stored content.
    render: fn(&regex::Captures) -> String,
}

macro_rules! extract_regex {
    ($name:ident, $pat:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pat).unwrap());
    };
}

extract_regex!(
    RE_PREFERENCE,
    r"(?i)\b(?:i|we|you|the user)\s+prefers?\s+([^.!?\n]{3,150})"
);
extract_regex!(
    RE_PREFERENCE_STYLE,
    r"(?i)\b(?:always|never)\s+use\s+([^.!?\n]{2,150})"
);
extract_regex!(
    RE_DECISION_LETS,
    r"(?i)\blet'?s\s+(?:use|go with|adopt|stick with)\s+([^.!?\n]{2,150})"
);
extract_regex!(
    RE_DECISION_WE,
    r"(?i)\bwe(?:'ll| will| should| can)?\s+(?:use|go with|adopt|switch to)\s+([^.!?\n]{2,150})"
);
extract_regex!(
    RE_DECISION_DECIDED,
    r"(?i)\bdecided\s+(?:to\s+use|on|to adopt)\s+([^.!?\n]{2,150})"
);
extract_regex!(
    RE_FACT_NOTE,
    r"(?i)\b(?:note that|keep in mind that|remember that|important:)\s+([^.!?\n]{4,200})"
);
extract_regex!(
    RE_FACT_PROJECT,
    r"(?i)\bthe\s+(?:project|codebase|app|service|system)\s+(?:uses|is built (?:on|with)|depends on|runs on)\s+([^.!?\n]{2,150})"
);
extract_regex!(
    RE_ENTITY,
    r"(?i)\b(?:a\s+(?:service|module|crate|file|table)\s+(?:called|named)|the\s+(?:service|module|crate|file|table))\s+`?([A-Za-z0-9_.:/\-]{2,80})`?"
);
extract_regex!(
    RE_RELATIONSHIP,
    r"(?i)\b([A-Za-z0-9_.\-]{2,60})\s+(depends on|imports|calls|extends|wraps|talks to)\s+([A-Za-z0-9_.\-]{2,60})"
);

fn first_capture(caps: &regex::Captures) -> String {
    caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default()
}

fn relationship_render(caps: &regex::Captures) -> String {
    format!(
        "{} {} {}",
        caps.get(1).map(|m| m.as_str()).unwrap_or_default(),
        caps.get(2).map(|m| m.as_str()).unwrap_or_default(),
        caps.get(3).map(|m| m.as_str()).unwrap_or_default(),
    )
}

static EXTRACTORS: LazyLock<Vec<Extractor>> = LazyLock::new(|| {
    vec![
        Extractor {
            memory_type: MemoryType::Preference,
            regex: &RE_PREFERENCE,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Preference,
            regex: &RE_PREFERENCE_STYLE,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Decision,
            regex: &RE_DECISION_LETS,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Decision,
            regex: &RE_DECISION_WE,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Decision,
            regex: &RE_DECISION_DECIDED,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Fact,
            regex: &RE_FACT_NOTE,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Fact,
            regex: &RE_FACT_PROJECT,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Entity,
            regex: &RE_ENTITY,
            render: first_capture,
        },
        Extractor {
            memory_type: MemoryType::Relationship,
            regex: &RE_RELATIONSHIP,
            render: relationship_render,
        },
    ]
});

/// Scan assistant text for memory candidates. Duplicate fragments within
/// one scan are collapsed.
pub fn extract_candidates(text: &str) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = Vec::new();

    for extractor in EXTRACTORS.iter() {
        for caps in extractor.regex.captures_iter(text) {
            let content = (extractor.render)(&caps);
            if content.is_empty() {
                continue;
            }
            let duplicate = candidates.iter().any(|c| {
                c.memory_type == extractor.memory_type
                    && normalize(&c.content) == normalize(&content)
            });
            if !duplicate {
                candidates.push(Candidate {
                    memory_type: extractor.memory_type,
                    content,
                });
            }
        }
    }

    candidates
}

/// Lowercased, whitespace-collapsed form used for similarity and dedup.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Surprise = 1 − max lexical similarity to any prior fragment of the same
/// type. No priors means maximally surprising.
pub fn surprise_score(candidate: &str, priors: &[String]) -> f64 {
    let normalized = normalize(candidate);
    let max_similarity = priors
        .iter()
        .map(|p| strsim::jaro_winkler(&normalized, &normalize(p)))
        .fold(0.0f64, f64::max);
    (1.0 - max_similarity).clamp(0.0, 1.0)
}

/// Initial importance: per-type base plus a surprise bonus, clamped.
pub fn initial_importance(memory_type: MemoryType, surprise: f64) -> f64 {
    (memory_type.base_importance() + 0.3 * surprise).clamp(0.0, 1.0)
}
