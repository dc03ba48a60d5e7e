//! Ordered deterministic matchers over normalized text.
//!
//! The first matcher that fires wins and the model is never consulted.
//! Order matters: domain question prefixes must beat the resource and
//! keyword matchers, since "ask srb about attendance" mentions attendance.

use std::sync::LazyLock;

use regex::Regex;

use super::normalize::canonical_subject;
use super::resources::ResourceKind;
use super::{Action, ResolvedIntent, labels, params};

/// A named pattern + extractor.
pub struct Matcher {
    /// Stable name, used in logs.
    pub name: &'static str,
    apply: fn(&str) -> Option<ResolvedIntent>,
}

impl Matcher {
    /// Try this matcher against normalized text.
    #[must_use]
    pub fn apply(&self, normalized: &str) -> Option<ResolvedIntent> {
        (self.apply)(normalized)
    }
}

/// All matchers in priority order.
pub static MATCHERS: &[Matcher] = &[
    Matcher {
        name: "rule-book-question",
        apply: rule_book_question,
    },
    Matcher {
        name: "tutor-question",
        apply: tutor_question,
    },
    Matcher {
        name: "resource",
        apply: resource,
    },
    Matcher {
        name: "open-rule-book",
        apply: open_rule_book,
    },
    Matcher {
        name: "navigation",
        apply: navigation,
    },
    Matcher {
        name: "portal-check",
        apply: portal_check,
    },
    Matcher {
        name: "keyword-table",
        apply: keyword_table,
    },
];

/// Run the matchers in order; returns the first hit and the matcher's name.
#[must_use]
pub fn match_command(normalized: &str) -> Option<(&'static str, ResolvedIntent)> {
    MATCHERS
        .iter()
        .find_map(|m| m.apply(normalized).map(|intent| (m.name, intent)))
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid matcher pattern");
            None
        }
    }
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| compile(p)).collect()
}

/// First `question` capture across `patterns`, trimmed of `?` and filler.
fn capture_question(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let question = caps
            .name("q")?
            .as_str()
            .trim()
            .trim_end_matches('?')
            .trim();
        (!question.is_empty()).then(|| question.to_owned())
    })
}

static RULE_BOOK_QUESTION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"^(?:hey\s+)?ask\s+(?:the\s+)?srb\s+(?:about|regarding|on|for|if|whether)?\s*(?P<q>.+)$",
        r"^what\s+does\s+(?:the\s+)?srb\s+say\s+(?:about|on|regarding)\s+(?P<q>.+)$",
        r"^(?:according\s+to|as\s+per|in)\s+(?:the\s+)?srb\s+(?P<q>.+)$",
        r"^srb\s+(?P<q>.+\?)$",
        r"^(?P<q>.+?)\s+(?:according\s+to|as\s+per|in)\s+(?:the\s+)?srb\s*\??$",
    ])
});

fn rule_book_question(text: &str) -> Option<ResolvedIntent> {
    let question = capture_question(&RULE_BOOK_QUESTION, text)?;
    let spoken = format!("Let me check the student rule book about {question}.");
    Some(
        ResolvedIntent::new(labels::ASK_RULE_BOOK, Action::DomainQuery, spoken)
            .with_param(params::QUESTION, question),
    )
}

static TUTOR_QUESTION: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"^(?:hey\s+)?ask\s+(?:the\s+|my\s+)?(?:ai\s+)?(?:tutor|study\s+(?:buddy|assistant))\s+(?:about|to\s+explain|regarding)?\s*(?P<q>.+)$",
        r"^(?:explain|teach\s+me)\s+(?P<q>.+)$",
    ])
});

fn tutor_question(text: &str) -> Option<ResolvedIntent> {
    let question = capture_question(&TUTOR_QUESTION, text)?;
    let spoken = format!("Let me look into {question} for you.");
    Some(
        ResolvedIntent::new(labels::ASK_TUTOR, Action::DomainQuery, spoken)
            .with_param(params::QUESTION, question),
    )
}

static RESOURCE_VERB: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"^(?:please\s+)?(?P<verb>download|get|fetch|open|show|find|list)\s+(?:me\s+)?(?:the\s+|all\s+)?(?P<rest>.+)$",
    )
});
static RESOURCE_KIND: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\b(?P<kind>pyq|notes?|syllabus)\b"));
static SEMESTER: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"\bsemester\s+(?P<sem>\d{1,2})\b"));
static SUBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"\b(?:for|of|on|in)\s+(?:the\s+)?(?P<subject>[a-z][a-z0-9 ']*?)(?:\s+(?:for\s+|of\s+|in\s+)?semester\s+\d{1,2})?\s*$")
});

/// Subject + semester + kind filters, as spoken in a resource request.
struct ResourceRequest {
    kind: ResourceKind,
    subject: Option<String>,
    semester: Option<String>,
}

fn parse_resource_request(rest: &str) -> Option<ResourceRequest> {
    let kind_caps = RESOURCE_KIND.as_ref()?.captures(rest)?;
    let kind = ResourceKind::parse(kind_caps.name("kind")?.as_str())?;

    let semester = SEMESTER
        .as_ref()
        .and_then(|re| re.captures(rest))
        .and_then(|c| c.name("sem"))
        .map(|m| m.as_str().trim_start_matches('0').to_owned())
        .filter(|s| !s.is_empty());

    // Subject is whatever follows for/of/on, minus the semester suffix.
    let subject = SUBJECT
        .as_ref()
        .and_then(|re| re.captures(rest))
        .and_then(|c| c.name("subject"))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|s| !s.is_empty() && !s.starts_with("semester"))
        .or_else(|| subject_around_kind(rest, kind_caps.get(0).map_or("", |m| m.as_str())))
        .map(|s| canonical_subject(&s));

    Some(ResourceRequest {
        kind,
        subject,
        semester,
    })
}

/// Subject for orders like "semester 5 ai pyq": the words left after
/// removing the kind, the semester and filler.
fn subject_around_kind(rest: &str, kind_word: &str) -> Option<String> {
    let leftover = rest.replace(kind_word, " ");
    let leftover = match SEMESTER.as_ref() {
        Some(re) => re.replace_all(&leftover, " ").into_owned(),
        None => leftover,
    };
    let words: Vec<&str> = leftover
        .split_whitespace()
        .filter(|w| !matches!(*w, "for" | "of" | "on" | "in" | "the" | "paper" | "papers"))
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn resource(text: &str) -> Option<ResolvedIntent> {
    let caps = RESOURCE_VERB.as_ref()?.captures(text)?;
    let verb = caps.name("verb")?.as_str();
    let request = parse_resource_request(caps.name("rest")?.as_str())?;

    let (action, prefix, spoken_verb) = match verb {
        "download" | "get" | "fetch" => (Action::DownloadResource, "download", "Downloading"),
        _ => (Action::OpenResourceList, "open", "Showing"),
    };

    let mut spoken = format!("{spoken_verb} {}", request.kind.spoken());
    if let Some(subject) = &request.subject {
        spoken.push_str(&format!(" for {subject}"));
    }
    if let Some(semester) = &request.semester {
        spoken.push_str(&format!(", semester {semester}"));
    }
    spoken.push('.');

    let mut intent = ResolvedIntent::new(
        format!("{prefix}-{}", request.kind.as_str()),
        action,
        spoken,
    );
    if let Some(subject) = request.subject {
        intent = intent.with_param(params::SUBJECT, subject);
    }
    if let Some(semester) = request.semester {
        intent = intent.with_param(params::SEMESTER, semester);
    }
    Some(intent)
}

static OPEN_RULE_BOOK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"^(?:(?:open|show|read|view)\s+(?:me\s+)?(?:the\s+)?)?srb(?:\s+(?:pdf|document|section))?$")
});

fn open_rule_book(text: &str) -> Option<ResolvedIntent> {
    OPEN_RULE_BOOK.as_ref()?.is_match(text).then(|| {
        ResolvedIntent::new(
            labels::OPEN_RULE_BOOK,
            Action::OpenResource,
            "Opening the student rule book.",
        )
    })
}

/// Portal pages reachable by navigation, with spoken names.
const PAGES: [(&str, &str, &str); 10] = [
    ("dashboard", "dashboard", "your dashboard"),
    ("home", "dashboard", "your dashboard"),
    ("profile", "profile", "your profile"),
    ("resources", "resources", "the resources page"),
    ("notices", "notices", "the notice board"),
    ("notice board", "notices", "the notice board"),
    ("settings", "settings", "settings"),
    ("library", "library", "the library"),
    ("fees", "fees", "the fees page"),
    ("courses", "courses", "your courses"),
];

static NAVIGATION: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"^(?:please\s+)?(?:go\s+(?:back\s+)?to|take\s+me\s+to|navigate\s+to|open|show)\s+(?:the\s+|my\s+)?(?P<page>[a-z ]+?)(?:\s+page)?$",
    )
});

fn navigation(text: &str) -> Option<ResolvedIntent> {
    let caps = NAVIGATION.as_ref()?.captures(text)?;
    let wanted = caps.name("page")?.as_str();
    let (_, page, spoken) = PAGES.iter().find(|(name, _, _)| *name == wanted)?;
    Some(
        ResolvedIntent::new(format!("go-{page}"), Action::Navigate, format!("Opening {spoken}."))
            .with_param(params::PAGE, *page),
    )
}

static ATTENDANCE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"\b(?:check|show|what(?:'s| is)|how\s+much|tell\s+me|view)\b.*\battendance\b|^attendance\b")
});
static SCHEDULE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"\b(?:schedule|timetable|time\s+table)\b|\bclasses\s+(?:today|tomorrow)\b|\bwhat\s+classes\b|\bnext\s+(?:class|lecture)\b")
});
static RESULTS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"\b(?:results?|grades?|marks|cgpa|sgpa|gpa|score\s*card)\b")
});
static ALERTS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"\b(?:alerts?|notifications?|announcements?|deadlines?|any\s+updates)\b")
});

fn portal_check(text: &str) -> Option<ResolvedIntent> {
    let hit = |re: &LazyLock<Option<Regex>>| re.as_ref().is_some_and(|re| re.is_match(text));
    if hit(&ATTENDANCE) {
        return Some(check_intent(Action::CheckAttendance));
    }
    if hit(&SCHEDULE) {
        return Some(check_intent(Action::CheckSchedule));
    }
    if hit(&RESULTS) {
        return Some(check_intent(Action::CheckResults));
    }
    if hit(&ALERTS) {
        return Some(check_intent(Action::CheckAlerts));
    }
    None
}

/// Canonical intent for a no-parameter portal check.
#[must_use]
pub fn check_intent(action: Action) -> ResolvedIntent {
    let spoken = match action {
        Action::CheckAttendance => "Checking your attendance.",
        Action::CheckSchedule => "Here's your class schedule.",
        Action::CheckResults => "Fetching your results.",
        Action::CheckAlerts => "Checking your alerts.",
        _ => "Okay.",
    };
    ResolvedIntent::new(action.as_str(), action, spoken)
}

/// Last-resort single-word table.
const KEYWORDS: [(&str, Action); 7] = [
    ("attendance", Action::CheckAttendance),
    ("classes", Action::CheckSchedule),
    ("exams", Action::CheckResults),
    ("notices", Action::CheckAlerts),
    ("pyq", Action::OpenResourceList),
    ("notes", Action::OpenResourceList),
    ("syllabus", Action::OpenResourceList),
];

fn keyword_table(text: &str) -> Option<ResolvedIntent> {
    let (keyword, action) = KEYWORDS
        .iter()
        .find(|(keyword, _)| text.split_whitespace().any(|w| w == *keyword))?;
    if *action == Action::OpenResourceList {
        // Reuse the resource parser so "ai pyq semester 5" keeps its filters.
        return resource(&format!("open {text}")).or_else(|| {
            let kind = ResourceKind::parse(keyword)?;
            Some(ResolvedIntent::new(
                format!("open-{}", kind.as_str()),
                Action::OpenResourceList,
                format!("Showing {}.", kind.spoken()),
            ))
        });
    }
    Some(check_intent(*action))
}

/// Looser scan over the action vocabulary, used only after the model path
/// failed to produce a valid intent.
#[must_use]
pub fn vocabulary_scan(normalized: &str) -> Option<ResolvedIntent> {
    if let Some(intent) = keyword_table(normalized) {
        return Some(intent);
    }
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let has = |w: &str| words.contains(&w);

    if has("download") {
        if let Some(intent) = resource(normalized) {
            return Some(intent);
        }
    }
    if has("srb") || normalized.contains("rule book") || has("rules") {
        let question = normalized.trim_end_matches('?').to_owned();
        return Some(
            ResolvedIntent::new(
                labels::ASK_RULE_BOOK,
                Action::DomainQuery,
                "Let me check the student rule book.",
            )
            .with_param(params::QUESTION, question),
        );
    }
    if has("navigate") || normalized.starts_with("go to") {
        return PAGES
            .iter()
            .find(|(name, _, _)| normalized.contains(name))
            .map(|(_, page, spoken)| {
                ResolvedIntent::new(format!("go-{page}"), Action::Navigate, format!("Opening {spoken}."))
                    .with_param(params::PAGE, *page)
            });
    }
    None
}
