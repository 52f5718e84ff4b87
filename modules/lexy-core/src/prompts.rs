//! Prompt text sent to the completion routes.

use lexy_common::{ChatMessage, Post, Sender};

/// System prompt for result-set summaries. The citation format here is what
/// the markup parser recognises as a citation.
pub const SUMMARY_SYSTEM_PROMPT: &str = "\
You are a research assistant summarising search results for the user.
Rules:
- Use ONLY the numbered sources supplied in the user message. Do not add outside knowledge.
- Cite every factual claim with an HTML anchor to the source it came from, written as <a href=\"SOURCE_URL\">[n]</a> where n is the source number.
- If the sources do not answer the question, say so plainly.
- Format the answer as HTML using <h3> for section headings, <p> for paragraphs, <ul>/<li> for lists, and <strong>/<em> for emphasis. Do not use markdown.";

pub const DEFAULT_SUMMARY_REQUEST: &str =
    "Summarise the main themes, opinions and recurring questions across these results.";

pub const CHAT_SYSTEM_PROMPT: &str = "\
You are continuing a conversation about a set of search results.
Answer the user's latest question using ONLY the numbered sources and the conversation so far.
Cite factual claims as <a href=\"SOURCE_URL\">[n]</a> using the source numbers.
Format the answer as HTML (<p>, <ul>/<li>, <strong>, <em>). Keep answers concise.";

/// `[i] title / URL / snippet` blocks, numbered from 1.
pub fn format_sources(posts: &[Post]) -> String {
    posts
        .iter()
        .enumerate()
        .map(|(i, post)| {
            format!(
                "[{}] {}\nURL: {}\nSnippet: {}",
                i + 1,
                post.title,
                post.display_link(),
                post.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn summary_user_prompt(posts: &[Post], request: Option<&str>) -> String {
    let request = request
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_SUMMARY_REQUEST);
    format!(
        "{request}\n\nSources ({}):\n{}",
        posts.len(),
        format_sources(posts)
    )
}

/// `User:` / `Assistant:` lines in send order.
pub fn transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.sender {
                Sender::User => "User",
                Sender::Ai => "Assistant",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Follow-up prompt: the full prior transcript, the original sources, and
/// the new question.
pub fn chat_user_prompt(history: &[ChatMessage], posts: &[Post], question: &str) -> String {
    format!(
        "Conversation so far:\n{}\n\nSources ({}):\n{}\n\nLatest question: {}",
        transcript(history),
        posts.len(),
        format_sources(posts),
        question.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_are_numbered_from_one_with_decoded_links() {
        let posts = vec![
            Post::new("First", "https://a.example/x%20y", "one"),
            Post::new("Second", "https://b.example", ""),
        ];
        let text = format_sources(&posts);
        assert!(text.starts_with("[1] First\nURL: https://a.example/x y\nSnippet: one"));
        assert!(text.contains("[2] Second"));
    }

    #[test]
    fn empty_result_set_lists_zero_sources() {
        let prompt = summary_user_prompt(&[], None);
        assert!(prompt.contains("Sources (0):"));
        assert!(!prompt.contains("[1]"));
    }

    #[test]
    fn override_replaces_default_request() {
        let prompt = summary_user_prompt(&[], Some("What do people hate?"));
        assert!(prompt.starts_with("What do people hate?"));
        assert!(!prompt.contains(DEFAULT_SUMMARY_REQUEST));
    }

    #[test]
    fn transcript_labels_speakers() {
        let msgs = vec![ChatMessage::ai("Summary"), ChatMessage::user("Why?")];
        assert_eq!(transcript(&msgs), "Assistant: Summary\n\nUser: Why?");
    }

    #[test]
    fn chat_prompt_carries_history_and_sources() {
        let msgs = vec![ChatMessage::ai("Summary")];
        let posts = vec![Post::new("T", "https://t.example", "s")];
        let prompt = chat_user_prompt(&msgs, &posts, " more? ");
        assert!(prompt.contains("Assistant: Summary"));
        assert!(prompt.contains("[1] T"));
        assert!(prompt.ends_with("Latest question: more?"));
    }
}
