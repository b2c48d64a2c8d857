//! User-turn boundary detection in chat-formatted prompts
//!
//! Chat templates usually prepend a system turn that the visualization should
//! not display. The resolver renders the conversation without a generation
//! prompt, finds where the user turn begins, and converts that character
//! offset to a token count so the display stream can slice the prompt.
//!
//! Detection is a fallback chain and never fails: known turn markers first,
//! then the raw user content, then offset 0 (nothing excluded). The result
//! is tagged so callers can tell a confident match from a heuristic one.

use crate::session::{ChatMessage, ModelSession};

/// Known user-turn marker substrings, tried in priority order.
///
/// First the Llama 3.x header, then the ChatML turn opener.
pub const USER_TURN_MARKERS: [&str; 2] = [
    "<|start_header_id|>user<|end_header_id|>",
    "<|im_start|>user",
];

/// Where the user turn begins in the chat rendering, as a token offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserBoundary {
    /// A known turn marker matched
    Marker {
        /// Tokens preceding the user turn
        token_offset: usize,
    },
    /// No marker; fell back to the position of the raw user content
    Content {
        /// Tokens preceding the user content
        token_offset: usize,
    },
    /// Neither found; nothing is excluded
    NotFound,
}

impl UserBoundary {
    /// The token offset to slice the prompt at (0 when nothing was found).
    #[must_use]
    pub fn token_offset(&self) -> usize {
        match *self {
            Self::Marker { token_offset } | Self::Content { token_offset } => token_offset,
            Self::NotFound => 0,
        }
    }

    /// Whether detection matched a known marker rather than a fallback.
    #[must_use]
    pub fn is_confident(&self) -> bool {
        matches!(self, Self::Marker { .. })
    }
}

/// Resolve where the user turn starts for `messages`.
///
/// `user_content` is the raw user message used for the content fallback.
/// The prefix before the boundary is tokenized without special tokens to get
/// the token count; a tokenizer that cannot round-trip the offset simply
/// yields whatever count it produces, and an offset of 0 stays 0.
#[must_use]
pub fn resolve_user_boundary(
    session: &dyn ModelSession,
    messages: &[ChatMessage],
    user_content: &str,
) -> UserBoundary {
    let rendered = session.render_chat(messages, false);

    for marker in USER_TURN_MARKERS {
        if let Some(pos) = rendered.find(marker) {
            return UserBoundary::Marker {
                token_offset: prefix_token_count(session, &rendered, pos),
            };
        }
    }

    if !user_content.is_empty() {
        if let Some(pos) = rendered.find(user_content) {
            return UserBoundary::Content {
                token_offset: prefix_token_count(session, &rendered, pos),
            };
        }
    }

    UserBoundary::NotFound
}

/// Token count of `rendered[..pos]`, without special tokens added.
fn prefix_token_count(session: &dyn ModelSession, rendered: &str, pos: usize) -> usize {
    if pos == 0 {
        return 0;
    }
    session.encode(&rendered[..pos], false).len()
}
