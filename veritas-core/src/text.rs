//! Text normalization and similarity utilities shared by every pipeline
//! phase: question-to-statement normalization of the user's input,
//! sentence splitting, tokenization, and Jaccard similarity.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn aux_verb_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(was|were|is|are|did|do|does|has|have|had|can|could|will|would|should|may|might)\s+(.+)$",
        )
        .unwrap()
    })
}

/// Predicate-starter tokens used to split a yes/no question's subject from
/// its predicate when no punctuation boundary is available.
const PREDICATE_STARTERS: &[&str] = &[
    "fair", "unfair", "legal", "illegal", "valid", "invalid", "true", "false", "correct",
    "accurate", "effective", "efficient", "safe", "dangerous", "necessary", "justified",
    "appropriate", "based", "supported", "consistent", "compliant", "responsible", "liable",
    "guilty", "innocent", "better", "worse", "more", "less", "going", "likely", "expected",
    "required", "designed", "built", "made", "caused", "responsible",
];

/// Normalize an input claim/question into its statement form.
///
/// Deterministic and idempotent: `normalize(normalize(x)) == normalize(x)`.
/// The normalized form is the only text that downstream analysis consumes;
/// the original string is kept only for display.
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_suffix('?')
        .unwrap_or(trimmed)
        .strip_suffix('.')
        .unwrap_or_else(|| trimmed.strip_suffix('?').unwrap_or(trimmed));
    let trimmed = collapse_whitespace(trimmed);

    let Some(caps) = aux_verb_re().captures(&trimmed) else {
        return trimmed;
    };
    let aux = caps.get(1).unwrap().as_str();
    let rest = caps.get(2).unwrap().as_str();

    if let Some(statement) = split_subject_predicate(aux, rest) {
        return collapse_whitespace(&statement);
    }

    let copula = matches!(aux.to_lowercase().as_str(), "is" | "are" | "was" | "were");
    let fallback_aux = if copula { aux } else { "is" };
    collapse_whitespace(&format!("It {fallback_aux} the case that {rest}"))
}

fn split_subject_predicate(aux: &str, rest: &str) -> Option<String> {
    let boundary = rest
        .find(')')
        .map(|i| i + 1)
        .or_else(|| rest.find(','))
        .or_else(|| find_predicate_starter(rest));

    let idx = boundary?;
    let (subject, predicate) = rest.split_at(idx);
    let subject = subject.trim().trim_end_matches(',');
    let predicate = predicate.trim().trim_start_matches(',').trim();
    if subject.is_empty() || predicate.is_empty() {
        return None;
    }
    let subject = capitalize(subject);
    Some(format!("{subject} {aux} {predicate}"))
}

fn find_predicate_starter(rest: &str) -> Option<usize> {
    let lower = rest.to_lowercase();
    let mut best: Option<usize> = None;
    for word in PREDICATE_STARTERS {
        if let Some(pos) = lower.find(&format!(" {word}")) {
            let start = pos + 1;
            best = Some(best.map_or(start, |b: usize| b.min(start)));
        }
    }
    best
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into sentences, protecting common abbreviations from being
/// mistaken for sentence boundaries.
pub fn split_sentences(text: &str) -> Vec<String> {
    let protected = text
        .replace("e.g.", "e.g\u{0}")
        .replace("i.e.", "i.e\u{0}")
        .replace("etc.", "etc\u{0}")
        .replace("vs.", "vs\u{0}")
        .replace("Mr.", "Mr\u{0}")
        .replace("Ms.", "Ms\u{0}")
        .replace("Dr.", "Dr\u{0}");

    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[.!?]+\s+|\n\n+").unwrap());

    re.split(&protected)
        .map(|s| s.trim().replace('\u{0}', ".").to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercase, alphanumeric-only tokenization used for similarity scoring.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

/// Jaccard similarity between two strings' token sets, in `[0, 1]`.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Token-overlap ratio of `a` covered by `b` (asymmetric; used for thesis
/// overlap checks where `a` is the smaller/claim side).
pub fn overlap_ratio(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() {
        return 0.0;
    }
    let shared = ta.intersection(&tb).count();
    shared as f64 / ta.len() as f64
}

/// Find the byte-range span of `needle` within `haystack`, searching from
/// `hint` forward first and falling back to a full scan.
pub fn find_span(haystack: &str, needle: &str, hint: usize) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }
    if hint <= haystack.len() {
        if let Some(pos) = haystack[hint..].find(needle) {
            let start = hint + pos;
            return Some((start, start + needle.len()));
        }
    }
    haystack.find(needle).map(|pos| (pos, pos + needle.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_yes_no_question_to_statement() {
        assert_eq!(
            normalize("Was the trial fair and based on the applicable law?"),
            "The trial was fair and based on the applicable law"
        );
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("Is the policy effective?");
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_strips_trailing_period_and_question_mark() {
        assert_eq!(normalize("The sky is blue."), "The sky is blue");
        assert_eq!(normalize("The sky is blue"), "The sky is blue");
    }

    #[test]
    fn normalize_falls_back_to_generic_template() {
        let out = normalize("Did the committee approve the budget");
        assert_eq!(out, "It is the case that the committee approve the budget");
    }

    #[test]
    fn split_sentences_protects_abbreviations() {
        let sentences = split_sentences("The report cites Dr. Smith, e.g. his 2020 paper. It concludes positively.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("Dr. Smith"));
        assert!(sentences[0].contains("e.g."));
    }

    #[test]
    fn jaccard_similarity_identical_is_one() {
        assert_eq!(jaccard_similarity("the sky is blue", "the sky is blue"), 1.0);
    }

    #[test]
    fn jaccard_similarity_disjoint_is_zero() {
        assert_eq!(jaccard_similarity("apples oranges", "zebras penguins"), 0.0);
    }

    #[test]
    fn find_span_locates_substring() {
        let (start, end) = find_span("the quick brown fox", "brown", 0).unwrap();
        assert_eq!(&"the quick brown fox"[start..end], "brown");
    }
}
