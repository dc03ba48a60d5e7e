//! Intent classification prompt.

use std::fmt::Write as _;

use super::{Action, labels};
use crate::conversation::{ConversationTurn, Role};

/// Build the classification prompt for a command no matcher recognized.
#[must_use]
pub fn build_intent_prompt(
    normalized: &str,
    history: &[ConversationTurn],
    page_context: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You route voice commands for a university student portal.\n\
         Choose exactly one action from this list:\n",
    );
    for action in Action::ALL {
        let _ = writeln!(prompt, "- {}: {}", action.as_str(), action.describe());
    }

    let _ = write!(
        prompt,
        "\nReply with a single JSON object and nothing else:\n\
         {{\"intent\": \"<short-kebab-label>\", \"action\": \"<action>\", \
         \"parameters\": {{\"<name>\": \"<string value>\"}}, \"response\": \"<one short spoken sentence>\"}}\n\
         All parameter values must be strings. Use intent \"{}\" for rule-book questions \
         and \"{}\" for study questions. Use action \"unknown\" if nothing fits.\n",
        labels::ASK_RULE_BOOK,
        labels::ASK_TUTOR,
    );

    if let Some(page) = page_context.map(str::trim).filter(|p| !p.is_empty()) {
        let _ = writeln!(prompt, "\nThe student is currently on the \"{page}\" page.");
    }

    if !history.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for turn in history {
            let who = match turn.role {
                Role::User => "Student",
                Role::Assistant => "Assistant",
            };
            let _ = writeln!(prompt, "{who}: {}", turn.content);
        }
    }

    let _ = write!(prompt, "\nCommand: {normalized}\n");
    prompt
}
