//! Chat about a single result, grounded in the scraped page.

use std::mem;
use std::sync::Arc;

use lexy_common::{ChatMessage, Post, RagRequest, ScrapeRequest, ScrapeResponse};
use tracing::{info, warn};

use crate::backend::LexyBackend;
use crate::credits::CreditGate;
use crate::error::{AnalysisError, TransitionError};
use crate::notice::{Notice, Notifier};
use crate::prompts::transcript;

/// Pages with less trimmed main content than this are not discussable.
pub const MIN_CONTENT_CHARS: usize = 100;

const FAILED_REPLY: &str = "Sorry, I couldn't answer that right now. Please try again.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DialogState {
    #[default]
    Closed,
    Scraping {
        post: Post,
    },
    Open {
        post: Post,
        page: ScrapeResponse,
        messages: Vec<ChatMessage>,
        awaiting_reply: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    Open(Post),
    Scraped(ScrapeResponse),
    UserSent(ChatMessage),
    ReplyReceived(ChatMessage),
    Dismiss,
}

impl DialogEvent {
    fn name(&self) -> &'static str {
        match self {
            DialogEvent::Open(_) => "open a discussion",
            DialogEvent::Scraped(_) => "show scraped content",
            DialogEvent::UserSent(_) => "send a message",
            DialogEvent::ReplyReceived(_) => "receive a reply",
            DialogEvent::Dismiss => "close",
        }
    }
}

impl DialogState {
    pub fn name(&self) -> &'static str {
        match self {
            DialogState::Closed => "closed",
            DialogState::Scraping { .. } => "loading the page",
            DialogState::Open {
                awaiting_reply: true,
                ..
            } => "awaiting a reply",
            DialogState::Open { .. } => "open",
        }
    }

    pub fn apply(&mut self, event: DialogEvent) -> Result<(), TransitionError> {
        use DialogEvent as E;
        use DialogState as S;

        let next = match (mem::take(self), event) {
            (_, E::Dismiss) => Ok(S::Closed),
            (S::Closed, E::Open(post)) => Ok(S::Scraping { post }),
            (S::Scraping { post }, E::Scraped(page)) => Ok(S::Open {
                post,
                page,
                messages: Vec::new(),
                awaiting_reply: false,
            }),
            (
                S::Open {
                    post,
                    page,
                    mut messages,
                    awaiting_reply: false,
                },
                E::UserSent(message),
            ) => {
                messages.push(message);
                Ok(S::Open {
                    post,
                    page,
                    messages,
                    awaiting_reply: true,
                })
            }
            (
                S::Open {
                    post,
                    page,
                    mut messages,
                    awaiting_reply: true,
                },
                E::ReplyReceived(message),
            ) => {
                messages.push(message);
                Ok(S::Open {
                    post,
                    page,
                    messages,
                    awaiting_reply: false,
                })
            }
            (state, event) => {
                let err = TransitionError {
                    state: state.name(),
                    action: event.name(),
                };
                Err((state, err))
            }
        };

        match next {
            Ok(state) => {
                *self = state;
                Ok(())
            }
            Err((state, err)) => {
                *self = state;
                Err(err)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, DialogState::Open { .. })
    }

    pub fn post(&self) -> Option<&Post> {
        match self {
            DialogState::Scraping { post } | DialogState::Open { post, .. } => Some(post),
            DialogState::Closed => None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        match self {
            DialogState::Open { messages, .. } => messages,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Opened,
    /// Too little content to discuss; the dialog closed itself.
    LimitedContent,
    ScrapeFailed,
}

pub struct DiscussionDialog {
    backend: Arc<dyn LexyBackend>,
    gate: Arc<CreditGate>,
    notifier: Arc<dyn Notifier>,
    state: DialogState,
}

impl DiscussionDialog {
    pub fn new(backend: Arc<dyn LexyBackend>, gate: Arc<CreditGate>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            gate,
            notifier,
            state: DialogState::Closed,
        }
    }

    pub fn state(&self) -> &DialogState {
        &self.state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.state.messages()
    }

    /// Scrape the post's page and open the chat. A page that cannot be
    /// discussed closes the dialog with a notice instead.
    pub async fn open(&mut self, post: Post) -> Result<OpenOutcome, AnalysisError> {
        self.gate.check()?;
        let email = self.gate.require_email()?;

        let url = post.display_link();
        self.state.apply(DialogEvent::Open(post))?;

        let req = ScrapeRequest {
            url: url.clone(),
            email: Some(email),
        };
        match self.backend.scrape(&req).await {
            Ok(page) => {
                let chars = page.summary.main_content.trim().chars().count();
                if chars < MIN_CONTENT_CHARS {
                    info!(url = url.as_str(), chars, "Page too short to discuss");
                    self.notifier.notify(Notice::warning(
                        "This page has limited content available, so a detailed analysis isn't possible.",
                    ));
                    self.state.apply(DialogEvent::Dismiss)?;
                    return Ok(OpenOutcome::LimitedContent);
                }
                self.state.apply(DialogEvent::Scraped(page))?;
                Ok(OpenOutcome::Opened)
            }
            Err(e) => {
                warn!(url = url.as_str(), error = %e, "Scrape failed");
                self.notifier
                    .notify(Notice::error("Could not load this page for discussion."));
                self.state.apply(DialogEvent::Dismiss)?;
                Ok(OpenOutcome::ScrapeFailed)
            }
        }
    }

    /// Ask about the open page. Earlier turns go along as `context`.
    pub async fn ask(&mut self, question: &str) -> Result<(), AnalysisError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AnalysisError::EmptyMessage);
        }
        self.gate.check()?;
        let email = self.gate.require_email()?;

        let (url, content, history) = match &self.state {
            DialogState::Open { post, page, messages, .. } => (
                post.display_link(),
                page.summary.main_content.clone(),
                messages.clone(),
            ),
            _ => (String::new(), String::new(), Vec::new()),
        };
        self.state.apply(DialogEvent::UserSent(ChatMessage::user(question)))?;

        let req = RagRequest {
            content,
            query: question.to_string(),
            url,
            email,
            context: (!history.is_empty()).then(|| transcript(&history)),
        };

        let reply = match self.backend.rag(&req).await {
            Ok(resp) => {
                self.gate.consume().await;
                resp.output
            }
            Err(e) => {
                warn!(error = %e, "Discussion reply failed");
                FAILED_REPLY.to_string()
            }
        };

        self.state.apply(DialogEvent::ReplyReceived(ChatMessage::ai(reply)))?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.state = DialogState::Closed;
    }
}
