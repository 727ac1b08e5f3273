use tokio::sync::mpsc::UnboundedSender;

use crate::ai::{GeminiClient, ImagenClient};
use crate::art::{ArtEvent, ArtModal, ArtState};
use crate::config::Config;
use crate::session::{ChatMessage, ChatSession, Mode, Role, SessionEvent, Submission};
use crate::speech::{SpeechCapability, SpeechEvent};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub show_chat: bool,
    pub input_mode: InputMode,

    // Chat state
    pub session: ChatSession,
    pub input: String,
    pub input_cursor: usize, // cursor position in input, in chars
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Speech state
    pub is_listening: bool,
    pub speech: SpeechCapability,

    // Art state
    pub show_topic_prompt: bool,
    pub topic_input: String,
    pub topic_cursor: usize,
    pub art: Option<ArtModal>,
    art_request_seq: u64,
    pub art_phrase_idx: usize,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
    tick_count: u8,

    // Config and collaborators
    pub config: Config,
    gemini: Option<GeminiClient>,
    imagen: Option<ImagenClient>,
    events: UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(config: Config, events: UnboundedSender<AppEvent>) -> Self {
        let api_key = config.resolved_api_key();
        let gemini = api_key.as_deref().map(GeminiClient::new);
        let imagen = api_key.as_deref().map(ImagenClient::new);
        let speech = SpeechCapability::detect(config.speech_command.as_deref(), events.clone());

        Self {
            should_quit: false,
            show_chat: false,
            input_mode: InputMode::Normal,

            session: ChatSession::new(),
            input: String::new(),
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            is_listening: false,
            speech,

            show_topic_prompt: false,
            topic_input: String::new(),
            topic_cursor: 0,
            art: None,
            art_request_seq: 0,
            art_phrase_idx: 0,

            animation_frame: 0,
            tick_count: 0,

            config,
            gemini,
            imagen,
            events,
        }
    }

    pub fn active_mode(&self) -> Mode {
        self.session.active_mode()
    }

    pub fn active_is_loading(&self) -> bool {
        self.session.is_loading(self.session.active_mode())
    }

    pub fn toggle_chat(&mut self) {
        self.show_chat = !self.show_chat;
        if self.show_chat {
            self.input_mode = InputMode::Editing;
            self.scroll_chat_to_bottom();
        } else {
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn switch_mode(&mut self) {
        let next = self.session.active_mode().other();
        self.session.set_active_mode(next);
        self.scroll_chat_to_bottom();
    }

    /// Submit the pending input (or an override, for final speech
    /// transcripts). Rejected submissions leave all state untouched.
    pub fn submit(&mut self, text_override: Option<&str>) {
        let text = text_override.unwrap_or(&self.input).to_string();

        let Some(client) = self.gemini.clone() else {
            if !text.trim().is_empty() {
                self.push_model_notice(
                    "Error: no API key configured. Set GEMINI_API_KEY or add api_key to config.json.",
                );
            }
            return;
        };

        let Some(submission) = self.session.begin_submit(&text) else {
            return;
        };

        self.input.clear();
        self.input_cursor = 0;
        self.scroll_chat_to_bottom();

        let prompt = build_prompt(self.session.messages(submission.mode));
        self.spawn_stream(client, submission, prompt);
    }

    fn spawn_stream(&self, client: GeminiClient, submission: Submission, prompt: String) {
        let events = self.events.clone();
        let model = self.config.text_model();
        let Submission { mode, .. } = submission;

        tokio::spawn(async move {
            let mut stream = match client.open_stream(&model, mode.persona(), &prompt).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, ?mode, "stream handshake failed");
                    let _ = events.send(AppEvent::Session(SessionEvent::Failed {
                        mode,
                        error: e.to_string(),
                    }));
                    return;
                }
            };

            if events
                .send(AppEvent::Session(SessionEvent::Opened { mode }))
                .is_err()
            {
                return;
            }

            loop {
                match stream.next_chunk().await {
                    Ok(Some(text)) => {
                        if events
                            .send(AppEvent::Session(SessionEvent::Chunk { mode, text }))
                            .is_err()
                        {
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = events.send(AppEvent::Session(SessionEvent::Closed { mode }));
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, ?mode, "stream read failed");
                        let _ = events.send(AppEvent::Session(SessionEvent::Failed {
                            mode,
                            error: e.to_string(),
                        }));
                        return;
                    }
                }
            }
        });
    }

    pub fn apply_session_event(&mut self, event: SessionEvent) {
        let mode = match &event {
            SessionEvent::Opened { mode }
            | SessionEvent::Chunk { mode, .. }
            | SessionEvent::Closed { mode }
            | SessionEvent::Failed { mode, .. } => *mode,
        };

        match event {
            SessionEvent::Opened { .. } => self.session.stream_opened(mode),
            SessionEvent::Chunk { text, .. } => self.session.append_chunk(mode, &text),
            SessionEvent::Closed { .. } => self.session.stream_closed(mode),
            SessionEvent::Failed { error, .. } => {
                tracing::warn!(%error, ?mode, "chat request failed");
                self.session.stream_failed(mode);
            }
        }

        if mode == self.session.active_mode() {
            self.scroll_chat_to_bottom();
        }
    }

    /// Append an informational model message to the active transcript
    /// without entering the request state machine.
    fn push_model_notice(&mut self, notice: &str) {
        let mode = self.session.active_mode();
        let duplicate = self
            .session
            .messages(mode)
            .last()
            .map(|m| m.content == notice)
            .unwrap_or(false);
        if !duplicate {
            self.session.push_notice(mode, notice);
        }
        self.scroll_chat_to_bottom();
    }

    // Speech integration

    pub fn toggle_listening(&mut self) {
        if self.is_listening {
            self.speech.stop();
            // `Ended` from the reader clears the flag, but the kill path may
            // never deliver it if the process is already gone.
            self.is_listening = false;
            return;
        }

        match self.speech.start() {
            Ok(true) => {
                // The transcript replaces whatever was typed, but only once
                // listening actually began.
                self.input.clear();
                self.input_cursor = 0;
                self.is_listening = true;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(error = %e, "failed to start speech recognition");
            }
        }
    }

    pub fn apply_speech_event(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::Interim(text) => {
                self.input_cursor = text.chars().count();
                self.input = text;
            }
            SpeechEvent::Final(text) => {
                self.input_cursor = text.chars().count();
                self.input = text.clone();
                self.submit(Some(&text));
            }
            SpeechEvent::Ended => {
                self.is_listening = false;
            }
            SpeechEvent::Error(error) => {
                tracing::warn!(%error, "speech recognition error");
                self.is_listening = false;
            }
        }
    }

    // Art modal

    pub fn open_topic_prompt(&mut self) {
        self.show_topic_prompt = true;
        self.topic_input.clear();
        self.topic_cursor = 0;
    }

    pub fn cancel_topic_prompt(&mut self) {
        self.show_topic_prompt = false;
        self.topic_input.clear();
        self.topic_cursor = 0;
    }

    /// Open the modal and issue the single-shot image request. The request
    /// id recorded on the modal gates late results.
    pub fn request_art(&mut self, topic: &str) {
        let topic = topic.trim().to_string();
        if topic.is_empty() {
            return;
        }
        self.show_topic_prompt = false;
        self.topic_input.clear();
        self.topic_cursor = 0;

        self.art_request_seq += 1;
        let request_id = self.art_request_seq;
        let mut modal = ArtModal::new(topic.clone(), request_id);
        self.art_phrase_idx = 0;

        let Some(client) = self.imagen.clone() else {
            modal.state = ArtState::Failed(
                "No API key configured. Set GEMINI_API_KEY or add api_key to config.json."
                    .to_string(),
            );
            self.art = Some(modal);
            return;
        };
        self.art = Some(modal);

        let events = self.events.clone();
        let model = self.config.image_model();
        tokio::spawn(async move {
            match client.generate(&model, &topic).await {
                Ok(image) => {
                    let _ = events.send(AppEvent::Art(ArtEvent::Ready { request_id, image }));
                }
                Err(e) => {
                    tracing::warn!(error = %e, %topic, "art generation failed");
                    let _ = events.send(AppEvent::Art(ArtEvent::Failed {
                        request_id,
                        message: e.to_string(),
                    }));
                }
            }
        });
    }

    /// Dismiss the modal. The in-flight request is not cancelled; its result
    /// fails the liveness check and is dropped.
    pub fn close_art_modal(&mut self) {
        self.art = None;
    }

    pub fn apply_art_event(&mut self, event: ArtEvent) {
        let (request_id, outcome) = match event {
            ArtEvent::Ready { request_id, image } => (request_id, ArtState::Ready(image)),
            ArtEvent::Failed {
                request_id,
                message,
            } => (request_id, ArtState::Failed(message)),
        };

        match &mut self.art {
            Some(modal) if modal.request_id == request_id => {
                if matches!(modal.state, ArtState::Loading) {
                    modal.state = outcome;
                }
            }
            _ => {
                tracing::debug!(request_id, "dropping stale art result");
            }
        }
    }

    pub fn save_art(&mut self) {
        let dir = self.config.download_dir();
        if let Some(modal) = &mut self.art {
            if let Err(e) = modal.save_to(&dir) {
                tracing::warn!(error = %e, "failed to save artwork");
            }
        }
    }

    // Animation and scrolling

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.active_is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
        self.tick_count = self.tick_count.wrapping_add(1);
        // Loading phrases rotate slower than the ellipsis.
        if self.tick_count % 10 == 0 {
            if let Some(modal) = &self.art {
                if matches!(modal.state, ArtState::Loading) {
                    self.art_phrase_idx =
                        (self.art_phrase_idx + 1) % crate::art::LOADING_PHRASES.len();
                }
            }
        }
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    /// Scroll the transcript so the newest content is visible.
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mode = self.session.active_mode();
        let mut total_lines: u16 = 0;

        for msg in self.session.messages(mode) {
            total_lines += 1; // Role line ("You:" or "AI:")
            for line in msg.content.lines() {
                // Character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // Blank line after message
        }

        if self.session.awaiting_first_chunk(mode) {
            total_lines += 2; // "AI:" + typing indicator
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }
}

/// Flatten a mode's transcript into a single prompt, ending with the user's
/// latest question. The greeting and persona framing live in the system
/// instruction, so only real turns are included.
fn build_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();

    let turns: Vec<&ChatMessage> = messages
        .iter()
        .skip(1) // greeting
        .collect();

    if turns.len() > 1 {
        prompt.push_str("Conversation so far:\n");
        for msg in &turns[..turns.len() - 1] {
            match msg.role {
                Role::User => prompt.push_str(&format!("User: {}\n", msg.content)),
                Role::Model => prompt.push_str(&format!("Assistant: {}\n", msg.content)),
            }
        }
        prompt.push('\n');
    }

    if let Some(last) = turns.last() {
        prompt.push_str(&last.content);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::GeneratedImage;
    use tokio::sync::mpsc;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Config {
            api_key: Some("test-key".to_string()),
            ..Config::new()
        };
        (App::new(config, tx), rx)
    }

    fn image() -> GeneratedImage {
        GeneratedImage {
            bytes: vec![1, 2, 3],
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn final_transcript_submits_exactly_once() {
        let (mut app, _rx) = test_app();
        app.show_chat = true;

        app.apply_speech_event(SpeechEvent::Interim("how doe".to_string()));
        assert_eq!(app.input, "how doe");
        assert_eq!(app.session.messages(Mode::Assistant).len(), 1);

        app.apply_speech_event(SpeechEvent::Final(
            "how does photosynthesis work".to_string(),
        ));

        let messages = app.session.messages(Mode::Assistant);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "how does photosynthesis work");
        assert!(app.active_is_loading());
        assert!(app.input.is_empty());

        // The in-flight request makes a repeat submission a no-op.
        app.apply_speech_event(SpeechEvent::Final(
            "how does photosynthesis work".to_string(),
        ));
        assert_eq!(app.session.messages(Mode::Assistant).len(), 2);
    }

    #[tokio::test]
    async fn mic_toggle_keeps_input_when_capability_unavailable() {
        let (mut app, _rx) = test_app();
        app.input = "half typed".to_string();
        app.input_cursor = 10;

        app.toggle_listening();

        assert!(!app.is_listening);
        assert_eq!(app.input, "half typed");
        assert_eq!(app.input_cursor, 10);
    }

    #[tokio::test]
    async fn mic_toggle_clears_input_once_listening_starts() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let config = Config {
            api_key: Some("test-key".to_string()),
            speech_command: Some("true".to_string()),
            ..Config::new()
        };
        let mut app = App::new(config, tx);
        app.input = "half typed".to_string();
        app.input_cursor = 10;

        app.toggle_listening();

        assert!(app.is_listening);
        assert!(app.input.is_empty());
        assert_eq!(app.input_cursor, 0);
    }

    #[tokio::test]
    async fn speech_end_and_error_clear_listening() {
        let (mut app, _rx) = test_app();
        app.is_listening = true;
        app.apply_speech_event(SpeechEvent::Ended);
        assert!(!app.is_listening);

        app.is_listening = true;
        app.apply_speech_event(SpeechEvent::Error("mic unplugged".to_string()));
        assert!(!app.is_listening);
    }

    #[tokio::test]
    async fn chunks_route_to_submit_time_mode() {
        let (mut app, _rx) = test_app();
        app.submit(Some("What is gravity?"));
        assert!(app.session.is_loading(Mode::Assistant));

        app.switch_mode();
        assert_eq!(app.active_mode(), Mode::Tutor);

        app.apply_session_event(SessionEvent::Opened {
            mode: Mode::Assistant,
        });
        app.apply_session_event(SessionEvent::Chunk {
            mode: Mode::Assistant,
            text: "Gravity ".to_string(),
        });
        app.apply_session_event(SessionEvent::Chunk {
            mode: Mode::Assistant,
            text: "pulls.".to_string(),
        });
        app.apply_session_event(SessionEvent::Closed {
            mode: Mode::Assistant,
        });

        let messages = app.session.messages(Mode::Assistant);
        assert_eq!(messages.last().unwrap().content, "Gravity pulls.");
        assert_eq!(app.session.messages(Mode::Tutor).len(), 1);
        assert!(!app.session.is_loading(Mode::Assistant));
    }

    #[tokio::test]
    async fn art_result_applies_when_modal_matches() {
        let (mut app, _rx) = test_app();
        app.request_art("Volcanoes");
        let id = app.art.as_ref().unwrap().request_id;

        app.apply_art_event(ArtEvent::Ready {
            request_id: id,
            image: image(),
        });

        assert!(matches!(
            app.art.as_ref().unwrap().state,
            ArtState::Ready(_)
        ));
    }

    #[tokio::test]
    async fn stale_art_result_is_dropped() {
        let (mut app, _rx) = test_app();
        app.request_art("Volcanoes");
        let first_id = app.art.as_ref().unwrap().request_id;

        // Modal dismissed before the result lands.
        app.close_art_modal();
        app.apply_art_event(ArtEvent::Ready {
            request_id: first_id,
            image: image(),
        });
        assert!(app.art.is_none());

        // Reopened with a new id: the old result still must not apply.
        app.request_art("Glaciers");
        app.apply_art_event(ArtEvent::Failed {
            request_id: first_id,
            message: "late failure".to_string(),
        });
        assert!(matches!(
            app.art.as_ref().unwrap().state,
            ArtState::Loading
        ));
    }

    #[tokio::test]
    async fn missing_api_key_yields_notice_not_request() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut config = Config::new();
        config.api_key = None;
        // Ensure the env var cannot leak in.
        std::env::remove_var("GEMINI_API_KEY");
        let mut app = App::new(config, tx);

        app.submit(Some("hello"));

        let messages = app.session.messages(Mode::Assistant);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Model);
        assert!(messages[1].content.contains("GEMINI_API_KEY"));
        assert!(!app.active_is_loading());
    }

    #[test]
    fn prompt_includes_prior_turns_but_not_greeting() {
        let messages = vec![
            ChatMessage {
                role: Role::Model,
                content: "greeting".to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: "first question".to_string(),
            },
            ChatMessage {
                role: Role::Model,
                content: "first answer".to_string(),
            },
            ChatMessage {
                role: Role::User,
                content: "second question".to_string(),
            },
        ];
        let prompt = build_prompt(&messages);
        assert!(!prompt.contains("greeting"));
        assert!(prompt.contains("User: first question"));
        assert!(prompt.contains("Assistant: first answer"));
        assert!(prompt.ends_with("second question"));
    }
}
