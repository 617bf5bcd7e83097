//! Request complexity scoring and task classification.
//!
//! Five subscores (tokens, tools, task type, code vocabulary, reasoning
//! vocabulary) plus a conversation-length bonus, clamped to [0, 100]. Force
//! patterns short-circuit the local/cloud recommendation in both directions.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use switchboard_common::types::routing::RoutingMode;
use switchboard_common::types::CanonicalRequest;

use crate::embeddings::{cosine_similarity, EmbeddingClient};
use crate::tools::select::TaskClass;

/// Where the analyzer recommends the request should run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recommendation {
    Local,
    Cloud,
}

/// Per-subscore breakdown, kept for decision observability.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScoreBreakdown {
    pub tokens: u32,
    pub tools: u32,
    pub task_type: u32,
    pub code: u32,
    pub reasoning: u32,
    pub conversation_bonus: u32,
    pub embedding_adjustment: Option<i32>,
}

#[derive(Clone, Debug)]
pub struct ComplexityReport {
    pub score: u32,
    pub breakdown: ScoreBreakdown,
    pub mode: RoutingMode,
    pub threshold: u32,
    pub recommendation: Recommendation,
    /// Set when a force pattern decided the recommendation.
    pub forced: Option<Recommendation>,
    pub classification: TaskClass,
}

// ---------------------------------------------------------------------------
// Pattern families
// ---------------------------------------------------------------------------

macro_rules! patterns {
    ($($pat:expr),* $(,)?) => {
        LazyLock::new(|| vec![$(Regex::new($pat).unwrap()),*])
    };
}

/// Greetings and trivialities that never need a cloud model.
static FORCE_LOCAL: LazyLock<Vec<Regex>> = patterns![
    r"(?i)^\s*(hi|hello|hey|yo|howdy)\b[\s!.,]*$",
    r"(?i)^\s*(thanks|thank you|ty|thx)\b",
    r"(?i)^\s*(ok|okay|cool|nice|great|got it|sounds good)[\s!.]*$",
    r"(?i)^\s*good (morning|afternoon|evening|night)\b",
    r"(?i)^\s*what time is it",
];

/// High-stakes work that always goes to a cloud model.
static FORCE_CLOUD: LazyLock<Vec<Regex>> = patterns![
    r"(?i)security (audit|review|assessment)",
    r"(?i)architecture review",
    r"(?i)production (incident|outage)",
    r"(?i)post-?mortem",
    r"(?i)vulnerabilit(y|ies)",
    r"(?i)penetration test",
    r"(?i)threat model",
];

struct TaskPattern {
    regex: &'static LazyLock<Regex>,
    points: u32,
    /// Architecture-scale work floors the total score; short prompts would
    /// otherwise never clear the cloud tiers.
    floors_score: bool,
}

macro_rules! task_regex {
    ($name:ident, $pat:expr) => {
        static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($pat).unwrap());
    };
}

task_regex!(RE_ENTIRE_CODEBASE, r"(?i)(entire|whole|complete) (codebase|project|repo)");
task_regex!(RE_FROM_SCRATCH, r"(?i)from scratch|greenfield|brand.new (project|service|app)");
task_regex!(
    RE_NEW_IMPL,
    r"(?i)(implement|build|create|add|design) (a |an |the )?new\b"
);
task_regex!(RE_REFACTOR, r"(?i)refactor|restructure|rewrite|migrate");
task_regex!(
    RE_TECHNICAL,
    r"(?i)debug|fix|error|bug|crash|optimi[sz]e|integrate|implement"
);
task_regex!(RE_YES_NO, r"(?i)^\s*(is|are|does|do|can|could|should|will|did|was|were)\b");
task_regex!(RE_SIMPLE_Q, r"(?i)^\s*(what|who|when|where|which|how many)\b");
task_regex!(RE_GREETING, r"(?i)^\s*(hi|hello|hey)\b");

/// Ordered most-complex first; the first match wins.
static TASK_PATTERNS: LazyLock<Vec<TaskPattern>> = LazyLock::new(|| {
    vec![
        TaskPattern {
            regex: &RE_ENTIRE_CODEBASE,
            points: 25,
            floors_score: true,
        },
        TaskPattern {
            regex: &RE_FROM_SCRATCH,
            points: 22,
            floors_score: true,
        },
        TaskPattern {
            regex: &RE_NEW_IMPL,
            points: 20,
            floors_score: false,
        },
        TaskPattern {
            regex: &RE_REFACTOR,
            points: 18,
            floors_score: false,
        },
        TaskPattern {
            regex: &RE_TECHNICAL,
            points: 12,
            floors_score: false,
        },
        TaskPattern {
            regex: &RE_YES_NO,
            points: 4,
            floors_score: false,
        },
        TaskPattern {
            regex: &RE_SIMPLE_Q,
            points: 3,
            floors_score: false,
        },
        TaskPattern {
            regex: &RE_GREETING,
            points: 0,
            floors_score: false,
        },
    ]
});

const GENERAL_TASK_POINTS: u32 = 8;

/// Code-complexity vocabulary, +5 per family hit, capped at 20.
static CODE_VOCAB: LazyLock<Vec<Regex>> = patterns![
    r"(?i)codebase|multi-?file|multiple files|across files|monorepo",
    r"(?i)architecture|microservices?|design pattern|modulari[sz]e",
    r"(?i)concurren|thread|async|race condition|deadlock|mutex|lock-free",
    r"(?i)security|authenticat|authori[sz]|encrypt",
    r"(?i)\btests?\b|testing|coverage|mock",
    r"(?i)performance|latency|throughput|benchmark|profil",
    r"(?i)database|\bsql\b|schema|migration|\bindex(es)?\b",
];

/// Reasoning-demand vocabulary, +3 per family hit, capped at 15.
static REASONING_VOCAB: LazyLock<Vec<Regex>> = patterns![
    r"(?i)step[ -]by[ -]step|walk (me )?through",
    r"(?i)trade-?offs?|pros and cons|compare|versus|\bvs\b",
    r"(?i)analy[sz]e|evaluate|assess|reason about",
    r"(?i)\bplan\b|roadmap|strategy|approach",
    r"(?i)edge cases?|corner cases?|failure modes?",
];

// ---------------------------------------------------------------------------
// Subscores
// ---------------------------------------------------------------------------

/// Rough token estimate: 4 characters per token.
fn estimate_tokens(request: &CanonicalRequest) -> u32 {
    let mut chars = request.system_text().map(|s| s.len()).unwrap_or(0);
    for msg in &request.messages {
        chars += msg.content.plain_text().len();
    }
    (chars / 4) as u32
}

fn token_score(tokens: u32) -> u32 {
    match tokens {
        0..=499 => 0,
        500..=999 => 4,
        1_000..=1_999 => 8,
        2_000..=3_999 => 12,
        4_000..=7_999 => 16,
        _ => 20,
    }
}

fn tool_score(count: usize) -> u32 {
    match count {
        0 => 0,
        1..=3 => 4,
        4..=6 => 8,
        7..=10 => 12,
        11..=15 => 16,
        _ => 20,
    }
}

fn task_type_score(text: &str) -> (u32, bool) {
    for p in TASK_PATTERNS.iter() {
        if p.regex.is_match(text) {
            return (p.points, p.floors_score);
        }
    }
    (GENERAL_TASK_POINTS, false)
}

fn vocab_score(text: &str, families: &[Regex], per_hit: u32, cap: u32) -> u32 {
    let hits = families.iter().filter(|re| re.is_match(text)).count() as u32;
    (hits * per_hit).min(cap)
}

fn matches_any(text: &str, families: &[Regex]) -> bool {
    families.iter().any(|re| re.is_match(text))
}

// ---------------------------------------------------------------------------
// Classification (consumed by smart tool selection)
// ---------------------------------------------------------------------------

static RE_FILE_READING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(read|show|open|display|look at|cat|inspect)\b.*\b(file|config|log|code|contents)")
        .unwrap()
});
static RE_CODE_WRITING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(write|implement|create|add|edit|fix|refactor|update)\b.*\b(code|function|class|module|test|file)")
        .unwrap()
});
static RE_SYSTEM_OPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(run|execute|install|deploy|restart|launch)\b|shell command").unwrap()
});
static RE_RESEARCH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(look up|research|search the web|fetch|latest version|documentation for)")
        .unwrap()
});

fn classify(text: &str, score: u32, threshold: u32, floors: bool) -> TaskClass {
    if floors || score >= threshold.max(60) {
        return TaskClass::ComplexTask;
    }
    if RE_SYSTEM_OPS.is_match(text) {
        return TaskClass::SystemOps;
    }
    if RE_RESEARCH.is_match(text) {
        return TaskClass::Research;
    }
    if RE_CODE_WRITING.is_match(text) {
        return TaskClass::CodeWriting;
    }
    if RE_FILE_READING.is_match(text) {
        return TaskClass::FileReading;
    }
    TaskClass::Conversational
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Reference texts for the optional embedding adjustment.
const REFERENCE_COMPLEX: &str =
    "Design and implement a large multi-file system with concurrency, careful error handling, \
     database schema migrations, and extensive tests across an entire codebase.";
const REFERENCE_SIMPLE: &str = "Hi! A quick one-line answer to a trivial everyday question.";

pub struct ComplexityAnalyzer {
    mode: RoutingMode,
    embeddings: Option<Arc<EmbeddingClient>>,
    references: tokio::sync::OnceCell<Option<(Vec<f32>, Vec<f32>)>>,
}

impl ComplexityAnalyzer {
    pub fn new(mode: RoutingMode, embeddings: Option<Arc<EmbeddingClient>>) -> Self {
        Self {
            mode,
            embeddings,
            references: tokio::sync::OnceCell::new(),
        }
    }

    /// Score a request. Pure except for the optional embedding RPC.
    pub async fn analyze(&self, request: &CanonicalRequest) -> ComplexityReport {
        let mut report = self.score(request);

        if report.forced.is_none() {
            if let Some(adjustment) = self.embedding_adjustment(&request.last_user_text()).await
            {
                let adjusted = (report.score as i64 + adjustment as i64).clamp(0, 100) as u32;
                report.breakdown.embedding_adjustment = Some(adjustment);
                report.score = adjusted;
                report.recommendation = if adjusted >= report.threshold {
                    Recommendation::Cloud
                } else {
                    Recommendation::Local
                };
            }
        }

        report
    }

    /// Synchronous scoring pass over the request text.
    pub fn score(&self, request: &CanonicalRequest) -> ComplexityReport {
        let text = request.last_user_text();
        let threshold = self.mode.threshold();

        let forced = if matches_any(&text, &FORCE_LOCAL) {
            Some(Recommendation::Local)
        } else if matches_any(&text, &FORCE_CLOUD) {
            Some(Recommendation::Cloud)
        } else {
            None
        };

        let (task_points, floors) = task_type_score(&text);
        let breakdown = ScoreBreakdown {
            tokens: token_score(estimate_tokens(request)),
            tools: tool_score(request.tools.len()),
            task_type: task_points,
            code: vocab_score(&text, &CODE_VOCAB, 5, 20),
            reasoning: vocab_score(&text, &REASONING_VOCAB, 3, 15),
            conversation_bonus: ((request.messages.len() as u32) / 2).min(5),
            embedding_adjustment: None,
        };

        let mut score = breakdown.tokens
            + breakdown.tools
            + breakdown.task_type
            + breakdown.code
            + breakdown.reasoning
            + breakdown.conversation_bonus;
        if floors {
            score = score.max(80);
        }
        let score = score.min(100);

        let recommendation = match forced {
            Some(forced) => forced,
            None => {
                if score >= threshold {
                    Recommendation::Cloud
                } else {
                    Recommendation::Local
                }
            }
        };

        ComplexityReport {
            score,
            breakdown,
            mode: self.mode,
            threshold,
            recommendation,
            forced,
            classification: classify(&text, score, threshold, floors),
        }
    }

    /// Cosine-similarity adjustment in [-10, +10] against the two reference
    /// embeddings. Any failure silently yields None.
    async fn embedding_adjustment(&self, text: &str) -> Option<i32> {
        if text.is_empty() {
            return None;
        }
        let client = self.embeddings.as_ref()?;

        let references = self
            .references
            .get_or_init(|| async {
                match client
                    .embed(&[REFERENCE_COMPLEX.to_string(), REFERENCE_SIMPLE.to_string()])
                    .await
                {
                    Ok(mut vectors) if vectors.len() == 2 => {
                        let simple = vectors.pop().unwrap();
                        let complex = vectors.pop().unwrap();
                        Some((complex, simple))
                    }
                    _ => None,
                }
            })
            .await
            .as_ref()?;

        let embedded = client.embed(&[text.to_string()]).await.ok()?;
        let vector = embedded.first()?;

        let toward_complex = cosine_similarity(vector, &references.0);
        let toward_simple = cosine_similarity(vector, &references.1);
        let adjustment = ((toward_complex - toward_simple) * 25.0).round() as i32;
        Some(adjustment.clamp(-10, 10))
    }
}
