//! Chat session state, independent of any UI framework.
//!
//! Each mode (Assistant, Tutor) owns its own transcript and its own phase
//! machine. Stream events always carry the mode captured at submit time, so
//! a reply keeps landing in the right transcript even if the user switches
//! tabs while it is still arriving.

use crate::ai::gemini::{ASSISTANT_PERSONA, TUTOR_PERSONA};

pub const APOLOGY: &str = "Sorry, I'm having trouble connecting right now.";

const ASSISTANT_GREETING: &str =
    "Hello! I'm Nexus, your AI learning assistant. How can I help you today?";
const TUTOR_GREETING: &str = "Welcome! I am your AI Tutor. I'm here to help you deepen your \
    understanding of any topic using the Socratic method. What shall we explore?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Assistant,
    Tutor,
}

impl Mode {
    pub fn title(&self) -> &'static str {
        match self {
            Mode::Assistant => "Assistant",
            Mode::Tutor => "Tutor Mode",
        }
    }

    pub fn other(&self) -> Mode {
        match self {
            Mode::Assistant => Mode::Tutor,
            Mode::Tutor => Mode::Assistant,
        }
    }

    /// System instruction sent with every request in this mode.
    pub fn persona(&self) -> &'static str {
        match self {
            Mode::Assistant => ASSISTANT_PERSONA,
            Mode::Tutor => TUTOR_PERSONA,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Per-mode request phase. `Sending` covers the window between issuing the
/// request and the stream opening; `Streaming` means the trailing model
/// message is growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
}

#[derive(Debug)]
struct ModeSession {
    messages: Vec<ChatMessage>,
    phase: Phase,
}

impl ModeSession {
    fn new(greeting: &str) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::Model,
                content: greeting.to_string(),
            }],
            phase: Phase::Idle,
        }
    }
}

/// Accepted submission: the mode acts as the immutable routing key for every
/// stream event that follows.
#[derive(Debug, Clone)]
pub struct Submission {
    pub mode: Mode,
    pub text: String,
}

/// Stream lifecycle events, emitted by the request task and applied on the
/// app event loop. The mode was fixed when the request was issued.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Opened { mode: Mode },
    Chunk { mode: Mode, text: String },
    Closed { mode: Mode },
    Failed { mode: Mode, error: String },
}

#[derive(Debug)]
pub struct ChatSession {
    assistant: ModeSession,
    tutor: ModeSession,
    active: Mode,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            assistant: ModeSession::new(ASSISTANT_GREETING),
            tutor: ModeSession::new(TUTOR_GREETING),
            active: Mode::Assistant,
        }
    }

    fn session(&self, mode: Mode) -> &ModeSession {
        match mode {
            Mode::Assistant => &self.assistant,
            Mode::Tutor => &self.tutor,
        }
    }

    fn session_mut(&mut self, mode: Mode) -> &mut ModeSession {
        match mode {
            Mode::Assistant => &mut self.assistant,
            Mode::Tutor => &mut self.tutor,
        }
    }

    pub fn active_mode(&self) -> Mode {
        self.active
    }

    pub fn set_active_mode(&mut self, mode: Mode) {
        self.active = mode;
    }

    pub fn messages(&self, mode: Mode) -> &[ChatMessage] {
        &self.session(mode).messages
    }

    pub fn is_loading(&self, mode: Mode) -> bool {
        self.session(mode).phase != Phase::Idle
    }

    /// True while the trailing model message of the active mode is still
    /// empty, i.e. the typing indicator should show.
    pub fn awaiting_first_chunk(&self, mode: Mode) -> bool {
        let session = self.session(mode);
        session.phase != Phase::Idle
            && session
                .messages
                .last()
                .map(|m| m.role != Role::Model || m.content.is_empty())
                .unwrap_or(true)
    }

    /// Accept a submission for the active mode. Returns `None` (and changes
    /// nothing) when the text trims empty or a request is already in flight
    /// for that mode.
    pub fn begin_submit(&mut self, text: &str) -> Option<Submission> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let mode = self.active;
        let session = self.session_mut(mode);
        if session.phase != Phase::Idle {
            return None;
        }
        session.messages.push(ChatMessage {
            role: Role::User,
            content: text.to_string(),
        });
        session.phase = Phase::Sending;
        Some(Submission {
            mode,
            text: text.to_string(),
        })
    }

    /// The stream handshake succeeded: append the empty model message the
    /// chunks will grow into.
    pub fn stream_opened(&mut self, mode: Mode) {
        let session = self.session_mut(mode);
        if session.phase != Phase::Sending {
            return;
        }
        session.messages.push(ChatMessage {
            role: Role::Model,
            content: String::new(),
        });
        session.phase = Phase::Streaming;
    }

    /// Append chunk text to the trailing model message. Chunks arrive in
    /// order on the app event channel; content only ever grows.
    pub fn append_chunk(&mut self, mode: Mode, text: &str) {
        let session = self.session_mut(mode);
        if session.phase != Phase::Streaming {
            return;
        }
        if let Some(last) = session.messages.last_mut() {
            if last.role == Role::Model {
                last.content.push_str(text);
            }
        }
    }

    pub fn stream_closed(&mut self, mode: Mode) {
        self.session_mut(mode).phase = Phase::Idle;
    }

    /// Append an informational model message outside the request machinery
    /// (configuration hints and similar). Phase is untouched.
    pub fn push_notice(&mut self, mode: Mode, content: &str) {
        self.session_mut(mode).messages.push(ChatMessage {
            role: Role::Model,
            content: content.to_string(),
        });
    }

    /// The request failed at any point. A still-empty trailing model message
    /// is replaced by the apology; partial content is preserved and the
    /// apology appended after it.
    pub fn stream_failed(&mut self, mode: Mode) {
        let session = self.session_mut(mode);
        match session.messages.last_mut() {
            Some(last) if last.role == Role::Model && last.content.is_empty() => {
                last.content = APOLOGY.to_string();
            }
            _ => {
                session.messages.push(ChatMessage {
                    role: Role::Model,
                    content: APOLOGY.to_string(),
                });
            }
        }
        session.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_content(session: &ChatSession, mode: Mode) -> &str {
        &session.messages(mode).last().unwrap().content
    }

    #[test]
    fn histories_start_with_greetings() {
        let session = ChatSession::new();
        assert_eq!(session.messages(Mode::Assistant).len(), 1);
        assert_eq!(session.messages(Mode::Tutor).len(), 1);
        assert_eq!(session.messages(Mode::Assistant)[0].role, Role::Model);
        assert_ne!(
            session.messages(Mode::Assistant)[0].content,
            session.messages(Mode::Tutor)[0].content
        );
    }

    #[test]
    fn submit_appends_user_message_before_any_response() {
        let mut session = ChatSession::new();
        let sub = session.begin_submit("What is gravity?").unwrap();
        assert_eq!(sub.mode, Mode::Assistant);
        let messages = session.messages(Mode::Assistant);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "What is gravity?");
        assert!(session.is_loading(Mode::Assistant));
    }

    #[test]
    fn blank_input_is_rejected() {
        let mut session = ChatSession::new();
        assert!(session.begin_submit("").is_none());
        assert!(session.begin_submit("   \n\t").is_none());
        assert_eq!(session.messages(Mode::Assistant).len(), 1);
        assert!(!session.is_loading(Mode::Assistant));
    }

    #[test]
    fn submit_while_loading_is_a_noop() {
        let mut session = ChatSession::new();
        session.begin_submit("first").unwrap();
        let before = session.messages(Mode::Assistant).len();
        assert!(session.begin_submit("second").is_none());
        assert_eq!(session.messages(Mode::Assistant).len(), before);
    }

    #[test]
    fn chunks_accumulate_into_trailing_model_message() {
        let mut session = ChatSession::new();
        let sub = session.begin_submit("What is gravity?").unwrap();
        session.stream_opened(sub.mode);

        let messages = session.messages(Mode::Assistant);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::Model);
        assert_eq!(messages[2].content, "");

        session.append_chunk(sub.mode, "Gravity ");
        session.append_chunk(sub.mode, "pulls.");
        session.stream_closed(sub.mode);

        assert_eq!(last_content(&session, Mode::Assistant), "Gravity pulls.");
        assert!(!session.is_loading(Mode::Assistant));
    }

    #[test]
    fn chunks_follow_submit_time_mode_not_active_tab() {
        let mut session = ChatSession::new();
        let sub = session.begin_submit("routed?").unwrap();
        session.stream_opened(sub.mode);

        // User switches to the other tab mid-stream.
        session.set_active_mode(Mode::Tutor);
        session.append_chunk(sub.mode, "still assistant");
        session.stream_closed(sub.mode);

        assert_eq!(last_content(&session, Mode::Assistant), "still assistant");
        assert_eq!(session.messages(Mode::Tutor).len(), 1);
    }

    #[test]
    fn modes_load_independently() {
        let mut session = ChatSession::new();
        session.begin_submit("assistant question").unwrap();
        session.set_active_mode(Mode::Tutor);
        // Tutor is idle, so its own submission goes through.
        let sub = session.begin_submit("tutor question").unwrap();
        assert_eq!(sub.mode, Mode::Tutor);
        assert!(session.is_loading(Mode::Assistant));
        assert!(session.is_loading(Mode::Tutor));
    }

    #[test]
    fn failure_with_no_content_replaces_placeholder() {
        let mut session = ChatSession::new();
        let sub = session.begin_submit("hi").unwrap();
        session.stream_opened(sub.mode);
        let len_before = session.messages(Mode::Assistant).len();

        session.stream_failed(sub.mode);

        assert_eq!(session.messages(Mode::Assistant).len(), len_before);
        assert_eq!(last_content(&session, Mode::Assistant), APOLOGY);
        assert!(!session.is_loading(Mode::Assistant));
    }

    #[test]
    fn failure_with_partial_content_appends_apology() {
        let mut session = ChatSession::new();
        let sub = session.begin_submit("hi").unwrap();
        session.stream_opened(sub.mode);
        session.append_chunk(sub.mode, "Hel");

        session.stream_failed(sub.mode);

        let messages = session.messages(Mode::Assistant);
        assert_eq!(messages[messages.len() - 2].content, "Hel");
        assert_eq!(messages.last().unwrap().content, APOLOGY);
    }

    #[test]
    fn failure_before_stream_opened_appends_apology() {
        let mut session = ChatSession::new();
        session.begin_submit("hi").unwrap();
        // Handshake failed: the trailing message is still the user's.
        session.stream_failed(Mode::Assistant);
        assert_eq!(last_content(&session, Mode::Assistant), APOLOGY);
        assert!(!session.is_loading(Mode::Assistant));
    }

    #[test]
    fn idle_after_stream_end_accepts_next_submission() {
        let mut session = ChatSession::new();
        let sub = session.begin_submit("one").unwrap();
        session.stream_opened(sub.mode);
        session.append_chunk(sub.mode, "done");
        session.stream_closed(sub.mode);

        assert!(session.begin_submit("two").is_some());
    }
}
