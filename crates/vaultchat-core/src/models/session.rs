use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::context_store::ContextEntry;
use super::transcript::{ChatMessage, ChatRecord, Role, Transcript};

/// Lead-in sentence placed before attached note sections on the opening
/// message.
const CONTEXT_LEAD_IN: &str = "Here are the files from my Obsidian vault that are relevant:";

/// Separator between rendered note sections.
const SECTION_DELIMITER: &str = "\n\n---\n\n";

/// Where the session currently is in a turn's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Submitting,
    Streaming,
    Committing,
}

/// Events emitted for decoupled UI updates. The rendering layer subscribes
/// to these instead of being interleaved with session logic.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A user turn was appended (before any network activity).
    UserTurn { text: String },
    /// A placeholder assistant turn should be shown.
    AssistantPending,
    /// Full accumulated assistant text so far. Render by replacing the
    /// placeholder's content; the redraw is idempotent.
    AssistantDelta { text: String },
    /// The assistant turn was committed to the transcript.
    AssistantCommitted { text: String },
    /// The stream failed; any partial text stays visible above the error.
    StreamFailed { partial: String, error: String },
    /// The stream ended without producing any output.
    NoResponse,
    /// Writing the chat record failed; the in-memory transcript is still
    /// authoritative.
    PersistFailed { error: String },
    /// A different conversation became active.
    TranscriptReplaced,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A turn is already in flight")]
    Busy,

    #[error("Cannot submit an empty message")]
    EmptyMessage,
}

/// A prepared outbound turn: the assembled message list plus the stream
/// epoch it was opened under.
#[derive(Debug)]
pub struct PreparedTurn {
    pub messages: Vec<ChatMessage>,
    pub epoch: u64,
}

/// What became of a finished stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Assistant turn committed; the transcript should be persisted.
    Committed,
    /// No deltas ever arrived; nothing committed, nothing to persist.
    NoResponse,
    /// The stream belonged to a transcript that is no longer active.
    Stale,
}

/// The streaming chat session state machine.
///
/// Owns the active transcript and the in-flight assistant accumulator.
/// Driven by discrete events (begin turn, stream opened, delta, finish,
/// fail); a controller performs the actual I/O between those events.
///
/// Every activation of a transcript bumps `epoch`; continuations of a
/// stream opened under an older epoch are ignored, so late deltas from an
/// abandoned stream can never mutate the newly active transcript.
pub struct ChatSession {
    transcript: Transcript,
    /// Context captured at the conversation's first submit, re-applied to
    /// the opening message on every request build so follow-up turns keep
    /// it in history. Never persisted.
    context_block: Option<String>,
    phase: SessionPhase,
    epoch: u64,
    accumulator: String,
    events: UnboundedSender<SessionEvent>,
}

impl ChatSession {
    pub fn new() -> (Self, UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        (
            Self {
                transcript: Transcript::new(),
                context_block: None,
                phase: SessionPhase::Idle,
                epoch: 0,
                accumulator: String::new(),
                events,
            },
            receiver,
        )
    }

    /// Sends are best-effort: a dropped receiver just means nobody is
    /// rendering.
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Start a turn: append the user message and assemble the outbound
    /// request. Rejects a second call while one turn is still in flight.
    pub fn begin_turn(
        &mut self,
        user_text: &str,
        context: &[ContextEntry],
    ) -> Result<PreparedTurn, SessionError> {
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        if self.phase != SessionPhase::Idle {
            return Err(SessionError::Busy);
        }

        let first_turn = self
            .transcript
            .turns()
            .iter()
            .all(|turn| turn.role != Role::User);
        if first_turn && !context.is_empty() {
            self.context_block = Some(render_context_block(context));
        }

        self.transcript.push_user(user_text);
        self.accumulator.clear();
        self.phase = SessionPhase::Submitting;

        self.emit(SessionEvent::UserTurn {
            text: user_text.to_string(),
        });
        self.emit(SessionEvent::AssistantPending);

        Ok(PreparedTurn {
            messages: self.outbound_messages(),
            epoch: self.epoch,
        })
    }

    /// The relay accepted the request and bytes are about to flow.
    pub fn stream_opened(&mut self, epoch: u64) {
        if epoch == self.epoch && self.phase == SessionPhase::Submitting {
            self.phase = SessionPhase::Streaming;
        }
    }

    /// Apply one content delta. Returns whether it was applied (stale
    /// continuations are dropped).
    pub fn apply_delta(&mut self, epoch: u64, fragment: &str) -> bool {
        if epoch != self.epoch {
            return false;
        }

        self.accumulator.push_str(fragment);
        self.emit(SessionEvent::AssistantDelta {
            text: self.accumulator.clone(),
        });
        true
    }

    /// The stream ended cleanly. Commits the accumulator as the assistant
    /// turn exactly once, or reports that nothing arrived.
    pub fn finish_stream(&mut self, epoch: u64) -> StreamOutcome {
        if epoch != self.epoch {
            return StreamOutcome::Stale;
        }

        if self.accumulator.is_empty() {
            self.phase = SessionPhase::Idle;
            self.emit(SessionEvent::NoResponse);
            return StreamOutcome::NoResponse;
        }

        self.phase = SessionPhase::Committing;
        let text = std::mem::take(&mut self.accumulator);
        self.transcript.push_assistant(text.clone());
        self.emit(SessionEvent::AssistantCommitted { text });
        self.phase = SessionPhase::Idle;

        StreamOutcome::Committed
    }

    /// The stream failed (transport, bad status, or provider error event).
    /// Partial text is surfaced, nothing is committed, and the user turn
    /// stays in the transcript so the conversation remains resumable.
    pub fn stream_failed(&mut self, epoch: u64, error: impl Into<String>) -> bool {
        if epoch != self.epoch {
            return false;
        }

        let partial = std::mem::take(&mut self.accumulator);
        self.phase = SessionPhase::Idle;
        self.emit(SessionEvent::StreamFailed {
            partial,
            error: error.into(),
        });
        true
    }

    /// Stamp the transcript for persistence; `None` when there is nothing
    /// to write.
    pub fn prepare_persist(&mut self, now: DateTime<Utc>) -> Option<ChatRecord> {
        self.transcript.prepare_persist(now)
    }

    /// Surface a failed persist without touching the transcript.
    pub fn note_persist_failed(&self, error: impl Into<String>) {
        self.emit(SessionEvent::PersistFailed {
            error: error.into(),
        });
    }

    /// Make a different transcript active, abandoning any in-flight stream.
    pub fn replace_transcript(&mut self, transcript: Transcript) {
        self.epoch += 1;
        self.phase = SessionPhase::Idle;
        self.accumulator.clear();
        self.context_block = None;
        self.transcript = transcript;
        self.emit(SessionEvent::TranscriptReplaced);
    }

    /// Reset to a fresh, never-persisted conversation.
    pub fn reset(&mut self) {
        self.replace_transcript(Transcript::new());
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn active_id(&self) -> Option<&str> {
        self.transcript.id()
    }

    /// Assemble the outbound message list: the whole history verbatim,
    /// except that the conversation's context block (if any) is prepended
    /// to the first user message.
    fn outbound_messages(&self) -> Vec<ChatMessage> {
        let mut context_block = self.context_block.as_deref();

        self.transcript
            .turns()
            .iter()
            .map(|turn| {
                let content = match turn.role {
                    Role::User => match context_block.take() {
                        Some(block) => compose_opening_message(block, &turn.text),
                        None => turn.text.clone(),
                    },
                    Role::Assistant => turn.text.clone(),
                };

                ChatMessage {
                    role: turn.role,
                    content,
                }
            })
            .collect()
    }
}

/// Render the attached notes as labeled sections in selection order.
fn render_context_block(entries: &[ContextEntry]) -> String {
    entries
        .iter()
        .map(|entry| format!("### {}\n\n{}", entry.display_name, entry.text))
        .collect::<Vec<_>>()
        .join(SECTION_DELIMITER)
}

fn compose_opening_message(context_block: &str, question: &str) -> String {
    format!("{CONTEXT_LEAD_IN}\n\n{context_block}\n\n---\n\nUser question: {question}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, text: &str) -> ContextEntry {
        ContextEntry {
            key: name.to_string(),
            display_name: name.to_string(),
            text: text.to_string(),
        }
    }

    fn drain(receiver: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_submit_without_context_sends_bare_message() {
        let (mut session, _rx) = ChatSession::new();

        let prepared = session.begin_turn("Hi", &[]).unwrap();

        assert_eq!(prepared.messages.len(), 1);
        assert_eq!(prepared.messages[0].role, Role::User);
        assert_eq!(prepared.messages[0].content, "Hi");
    }

    #[test]
    fn test_first_turn_context_precedes_question() {
        let (mut session, _rx) = ChatSession::new();

        let prepared = session
            .begin_turn("Summarize", &[entry("notes/a.md", "Alpha")])
            .unwrap();

        let content = &prepared.messages[0].content;
        let name_at = content.find("notes/a.md").unwrap();
        let text_at = content.find("Alpha").unwrap();
        let question_at = content.find("Summarize").unwrap();

        assert!(name_at < question_at);
        assert!(text_at < question_at);
    }

    #[test]
    fn test_context_sections_follow_selection_order() {
        let (mut session, _rx) = ChatSession::new();

        let prepared = session
            .begin_turn("Go", &[entry("b.md", "B"), entry("a.md", "A")])
            .unwrap();

        let content = &prepared.messages[0].content;
        assert!(content.find("b.md").unwrap() < content.find("a.md").unwrap());
    }

    #[test]
    fn test_follow_up_keeps_context_on_opening_message_only() {
        let (mut session, _rx) = ChatSession::new();

        let first = session
            .begin_turn("Summarize", &[entry("notes/a.md", "Alpha")])
            .unwrap();
        session.apply_delta(first.epoch, "Done.");
        session.finish_stream(first.epoch);

        // Context attached after the opening turn must not enter the request.
        let second = session
            .begin_turn("And then?", &[entry("late.md", "Late")])
            .unwrap();

        assert_eq!(second.messages.len(), 3);
        assert!(second.messages[0].content.contains("Alpha"));
        assert_eq!(second.messages[1].content, "Done.");
        assert_eq!(second.messages[2].content, "And then?");
        assert!(!second.messages[2].content.contains("Late"));
    }

    #[test]
    fn test_transcript_stores_raw_user_text() {
        let (mut session, _rx) = ChatSession::new();

        session
            .begin_turn("Summarize", &[entry("notes/a.md", "Alpha")])
            .unwrap();

        assert_eq!(session.transcript().turns()[0].text, "Summarize");
        assert_eq!(session.transcript().derive_title(), "Summarize");
    }

    #[test]
    fn test_second_submit_while_in_flight_is_rejected() {
        let (mut session, _rx) = ChatSession::new();

        let first = session.begin_turn("one", &[]).unwrap();
        session.apply_delta(first.epoch, "partial");

        let err = session.begin_turn("two", &[]).unwrap_err();
        assert!(matches!(err, SessionError::Busy));

        // The rejected call must not disturb the in-flight accumulator.
        assert!(session.apply_delta(first.epoch, " more"));
        assert_eq!(session.finish_stream(first.epoch), StreamOutcome::Committed);
        assert_eq!(session.transcript().turns()[1].text, "partial more");
    }

    #[test]
    fn test_deltas_commit_exactly_once() {
        let (mut session, mut rx) = ChatSession::new();

        let prepared = session.begin_turn("Hi", &[]).unwrap();
        session.apply_delta(prepared.epoch, "Hel");
        session.apply_delta(prepared.epoch, "lo");

        assert_eq!(session.finish_stream(prepared.epoch), StreamOutcome::Committed);

        let assistant_turns: Vec<_> = session
            .transcript()
            .turns()
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .collect();
        assert_eq!(assistant_turns.len(), 1);
        assert_eq!(assistant_turns[0].text, "Hello");

        let commits = drain(&mut rx)
            .into_iter()
            .filter(|event| matches!(event, SessionEvent::AssistantCommitted { .. }))
            .count();
        assert_eq!(commits, 1);
    }

    #[test]
    fn test_empty_stream_commits_nothing() {
        let (mut session, mut rx) = ChatSession::new();

        let prepared = session.begin_turn("Hi", &[]).unwrap();
        assert_eq!(
            session.finish_stream(prepared.epoch),
            StreamOutcome::NoResponse
        );

        assert_eq!(session.transcript().turns().len(), 1);
        assert!(
            drain(&mut rx)
                .iter()
                .any(|event| matches!(event, SessionEvent::NoResponse))
        );
    }

    #[test]
    fn test_failure_retains_partial_and_user_turn() {
        let (mut session, mut rx) = ChatSession::new();

        let prepared = session.begin_turn("Hi", &[]).unwrap();
        session.apply_delta(prepared.epoch, "Hel");
        session.stream_failed(prepared.epoch, "overloaded");

        assert_eq!(session.transcript().turns().len(), 1);
        assert_eq!(session.phase(), SessionPhase::Idle);

        let failure = drain(&mut rx)
            .into_iter()
            .find_map(|event| match event {
                SessionEvent::StreamFailed { partial, error } => Some((partial, error)),
                _ => None,
            })
            .unwrap();
        assert_eq!(failure, ("Hel".to_string(), "overloaded".to_string()));
    }

    #[test]
    fn test_stale_stream_cannot_touch_new_transcript() {
        let (mut session, _rx) = ChatSession::new();

        let abandoned = session.begin_turn("old chat", &[]).unwrap();
        session.apply_delta(abandoned.epoch, "early ");

        session.reset();

        assert!(!session.apply_delta(abandoned.epoch, "late delta"));
        assert_eq!(
            session.finish_stream(abandoned.epoch),
            StreamOutcome::Stale
        );
        assert!(!session.stream_failed(abandoned.epoch, "too late"));
        assert!(session.transcript().is_empty());

        // The new transcript accepts its own stream normally.
        let fresh = session.begin_turn("new chat", &[]).unwrap();
        assert!(session.apply_delta(fresh.epoch, "ok"));
        assert_eq!(session.finish_stream(fresh.epoch), StreamOutcome::Committed);
        assert_eq!(session.transcript().turns()[1].text, "ok");
    }

    #[test]
    fn test_empty_message_is_rejected() {
        let (mut session, _rx) = ChatSession::new();

        assert!(matches!(
            session.begin_turn("   ", &[]),
            Err(SessionError::EmptyMessage)
        ));
    }

    #[test]
    fn test_phase_transitions() {
        let (mut session, _rx) = ChatSession::new();
        assert_eq!(session.phase(), SessionPhase::Idle);

        let prepared = session.begin_turn("Hi", &[]).unwrap();
        assert_eq!(session.phase(), SessionPhase::Submitting);

        session.stream_opened(prepared.epoch);
        assert_eq!(session.phase(), SessionPhase::Streaming);

        session.apply_delta(prepared.epoch, "x");
        session.finish_stream(prepared.epoch);
        assert_eq!(session.phase(), SessionPhase::Idle);
    }
}
