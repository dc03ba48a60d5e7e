//! Transcription clean-up applied once before matching.
//!
//! Speech recognizers routinely mangle the portal's jargon: "pyq" comes back
//! as "py", "p y q" or "pie queue", and "srb" as "s r b" or "srp". These
//! rewrites are pure and conservative: they only touch whole words.

use std::sync::LazyLock;

use regex::Regex;

/// Ordered `(pattern, replacement)` rewrites over lowercased text.
static REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        // "previous year questions/papers" and spelled-out or misheard "pyq".
        (r"\bprevious\s+years?\s+(?:question\s+)?(?:papers?|questions?)\b", "pyq"),
        (r"\bp\.?\s*y\.?\s*q\.?(?:'?s)?(?:\s|$)", "pyq "),
        (r"\bpie\s+(?:queue|cue|q)s?\b", "pyq"),
        (r"\bpy(?:qs|q's)?\b", "pyq"),
        // "srb" (student rule book) in its spelled and misheard forms.
        (r"\bstudent\s+rule\s*book\b", "srb"),
        (r"\bs\.?\s*r\.?\s*b\b\.?", "srb"),
        (r"\bs\.?\s*r\.?\s*p\b\.?", "srb"),
        // "sem 5", "sem5", "semester5" all read as "semester 5".
        (r"\bsem(?:ester)?s?\s*(\d{1,2})\b", "semester $1"),
        (r"\bsem\b", "semester"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| match Regex::new(pattern) {
        Ok(re) => Some((re, replacement)),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid normalization pattern");
            None
        }
    })
    .collect()
});

/// Ordinal words for semesters ("fifth semester" → "semester 5").
const ORDINALS: [(&str, &str); 8] = [
    ("first", "1"),
    ("second", "2"),
    ("third", "3"),
    ("fourth", "4"),
    ("fifth", "5"),
    ("sixth", "6"),
    ("seventh", "7"),
    ("eighth", "8"),
];

/// Subject abbreviations as commonly spoken.
const SUBJECT_ALIASES: [(&str, &str); 14] = [
    ("ai", "Artificial Intelligence"),
    ("ml", "Machine Learning"),
    ("dbms", "Database Management Systems"),
    ("os", "Operating Systems"),
    ("cn", "Computer Networks"),
    ("dsa", "Data Structures and Algorithms"),
    ("ds", "Data Structures"),
    ("daa", "Design and Analysis of Algorithms"),
    ("toc", "Theory of Computation"),
    ("coa", "Computer Organization and Architecture"),
    ("oop", "Object Oriented Programming"),
    ("oops", "Object Oriented Programming"),
    ("se", "Software Engineering"),
    ("cd", "Compiler Design"),
];

/// Normalize a raw command for matching.
///
/// Lowercases, collapses jargon misrecognitions to canonical tokens, strips
/// punctuation other than `?`, and collapses whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = text.trim().to_lowercase();

    for (ordinal, digit) in ORDINALS {
        let spoken = format!("{ordinal} semester");
        if out.contains(&spoken) {
            out = out.replace(&spoken, &format!("semester {digit}"));
        }
    }

    for (re, replacement) in REWRITES.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).into_owned();
        }
    }

    let cleaned: String = out
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '?' || c == '\'' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical subject name for a spoken subject phrase.
///
/// Known abbreviations expand to their full name; anything else is title-cased.
#[must_use]
pub fn canonical_subject(raw: &str) -> String {
    let key = raw.trim().trim_matches('?').trim().to_lowercase();
    if let Some((_, full)) = SUBJECT_ALIASES.iter().find(|(alias, _)| *alias == key) {
        return (*full).to_owned();
    }
    key.split_whitespace()
        .map(|word| {
            if matches!(word, "and" | "of" | "in" | "for") {
                return word.to_owned();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn collapses_pyq_variants() {
        for raw in [
            "download py for AI",
            "download pyqs for AI",
            "download p y q for AI",
            "download P.Y.Q. for AI",
            "download pie queue for AI",
            "download previous year papers for AI",
        ] {
            assert_eq!(normalize(raw), "download pyq for ai", "input: {raw}");
        }
    }

    #[test]
    fn collapses_srb_variants() {
        for raw in ["srb", "S R B", "s.r.b.", "SRP", "student rule book"] {
            assert_eq!(normalize(raw), "srb", "input: {raw}");
        }
    }

    #[test]
    fn expands_semester_forms() {
        assert_eq!(normalize("notes sem 5"), "notes semester 5");
        assert_eq!(normalize("notes sem5"), "notes semester 5");
        assert_eq!(normalize("notes fifth semester"), "notes semester 5");
        assert_eq!(normalize("which sem?"), "which semester?");
    }

    #[test]
    fn leaves_unrelated_words_alone() {
        assert_eq!(normalize("Python notes"), "python notes");
        assert_eq!(normalize("open the spy novel"), "open the spy novel");
        assert_eq!(normalize("  check,  my attendance!! "), "check my attendance");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("Download P Y Q for DBMS sem 3, please");
        assert_eq!(normalize(&once), once);
    }

    #[test]
    fn subject_aliases_expand() {
        assert_eq!(canonical_subject("ai"), "Artificial Intelligence");
        assert_eq!(canonical_subject("DBMS"), "Database Management Systems");
        assert_eq!(canonical_subject("theory of computation"), "Theory of Computation");
        assert_eq!(canonical_subject("artificial intelligence"), "Artificial Intelligence");
    }
}
