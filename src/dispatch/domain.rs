//! Prompts for domain questions.

use std::fmt::Write as _;

use crate::conversation::{ConversationTurn, Role};

/// Words that mark a turn as part of a rule-book sub-dialogue.
pub const RULE_BOOK_TOPICS: &[&str] = &["srb", "rule book", "rulebook", "rule", "regulation"];

/// Relevant turns recalled for a rule-book follow-up.
pub const RULE_BOOK_RECALL: usize = 4;

/// Recent turns recalled for a study question.
pub const STUDY_RECALL: usize = 5;

fn push_history(prompt: &mut String, history: &[ConversationTurn]) {
    if history.is_empty() {
        return;
    }
    prompt.push_str("\nEarlier in this conversation:\n");
    for turn in history {
        let who = match turn.role {
            Role::User => "Student",
            Role::Assistant => "Assistant",
        };
        let _ = writeln!(prompt, "{who}: {}", turn.content);
    }
}

/// Rule-book question grounded on the document text.
#[must_use]
pub fn rule_book_prompt(document: &str, history: &[ConversationTurn], question: &str) -> String {
    let mut prompt = String::from(
        "You answer questions about the university's Student Rule Book (SRB).\n\
         Answer only from the rule book text below. If the rule book does not cover \
         the question, say so. Keep the answer to two or three spoken sentences and \
         mention the rule or section number when there is one.\n\
         \n--- RULE BOOK ---\n",
    );
    prompt.push_str(document.trim());
    prompt.push_str("\n--- END RULE BOOK ---\n");
    push_history(&mut prompt, history);
    let _ = write!(prompt, "\nQuestion: {question}\n");
    prompt
}

/// General study question.
#[must_use]
pub fn study_prompt(history: &[ConversationTurn], question: &str) -> String {
    let mut prompt = String::from(
        "You are a patient study assistant for university students.\n\
         Explain clearly in at most four spoken sentences. No markdown, no lists.\n",
    );
    push_history(&mut prompt, history);
    let _ = write!(prompt, "\nQuestion: {question}\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_book_prompt_embeds_document_and_history() {
        let history = vec![ConversationTurn::user("ask srb about leave")];
        let prompt = rule_book_prompt("Rule 4.2: 75% attendance.", &history, "what about medical leave");
        assert!(prompt.contains("Rule 4.2: 75% attendance."));
        assert!(prompt.contains("Student: ask srb about leave"));
        assert!(prompt.trim_end().ends_with("Question: what about medical leave"));
    }

    #[test]
    fn study_prompt_without_history() {
        let prompt = study_prompt(&[], "what is recursion");
        assert!(!prompt.contains("Earlier in this conversation"));
        assert!(prompt.contains("Question: what is recursion"));
    }
}
