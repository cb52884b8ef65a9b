//! The per-session room actor: participants, document, OT buffer,
//! language, and run history (`spec.md` §4.4).
//!
//! Grounded on `crates/gateway/src/broadcast.rs`'s shape (build a
//! frame, decide who receives it, hand the decision back to the
//! caller) but kept free of any WebSocket or locking concerns itself —
//! a `Room` is pure state plus pure transitions; the caller (the
//! collab service) owns the `Mutex<Room>` and performs the actual
//! delivery via the messaging bus.

use crate::ot::{OtBuffer, OtError};
use crate::types::{DocState, Edit, Outgoing, Recipient};
use peerdev_protocol::{frame_type, Frame};
use peerdev_sandbox::ExecResult;
use std::collections::HashMap;

pub const DEFAULT_LANGUAGE: &str = "python";
const MAX_PARTICIPANTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room already has two participants")]
    RoomFull,
}

/// In-memory state for one collaboration session. Owned by whichever
/// instance currently hosts its WebSocket connections.
pub struct Room {
    pub match_id: String,
    pub language: String,
    pub doc: DocState,
    ot: OtBuffer,
    participants: Vec<String>,
    run_history: Vec<Frame>,
    /// Set when the last participant left and the grace timer is
    /// running; cleared on rejoin (`spec.md` §4.4 "Join/leave").
    pub ending: bool,
    /// Unix seconds this room actor was created, for the `session_ended`
    /// duration field (`spec.md` §4.6).
    pub started_at: i64,
}

impl Room {
    pub fn new(match_id: impl Into<String>, started_at: i64) -> Self {
        Self {
            match_id: match_id.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            doc: DocState::empty(),
            ot: OtBuffer::new(),
            participants: Vec::new(),
            run_history: Vec::new(),
            ending: false,
            started_at,
        }
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// `spec.md` §4.4 "Join/leave": reject a third distinct client;
    /// rejoining an already-registered user is a no-op (a reconnect).
    pub fn join(&mut self, user_id: &str) -> Result<(), RoomError> {
        if self.has_participant(user_id) {
            return Ok(());
        }
        if self.participants.len() >= MAX_PARTICIPANTS {
            return Err(RoomError::RoomFull);
        }
        if self.participants.is_empty() {
            self.ending = false;
        }
        self.participants.push(user_id.to_string());
        Ok(())
    }

    pub fn leave(&mut self, user_id: &str) {
        self.participants.retain(|p| p != user_id);
    }

    /// `spec.md` §4.4 "Init exchange". `templates` maps a language name
    /// to its starter code; empty/missing entries leave the doc empty.
    pub fn init(&mut self, language: Option<String>, templates: &HashMap<String, String>) -> Vec<Outgoing> {
        if let Some(lang) = language.filter(|l| !l.is_empty()) {
            self.language = lang;
        }
        if self.doc.text.is_empty() {
            if let Some(template) = templates.get(&self.language).filter(|t| !t.is_empty()) {
                self.doc.text = template.clone();
                self.doc.version += 1;
                self.ot.reset();
            }
        }
        let mut out = vec![Outgoing::new(
            Recipient::Sender,
            Frame::new(
                frame_type::INIT,
                serde_json::json!({
                    "sessionId": self.match_id,
                    "doc": self.doc,
                    "language": self.language,
                }),
            ),
        )];
        out.extend(self.run_history.iter().cloned().map(|f| Outgoing::new(Recipient::Sender, f)));
        out
    }

    /// `spec.md` §4.4 "Edit application".
    pub fn apply_edit(&mut self, edit: &Edit) -> Vec<Outgoing> {
        if edit.range_end < edit.range_start {
            return self.edit_rejected(OtError::InvalidRange.code());
        }
        let transformed = self.ot.transform(edit.base_version, edit.range_start, edit.range_end, self.doc.version);
        let (start, end) = match transformed {
            Ok(range) => range,
            Err(e) => return self.edit_rejected(e.code()),
        };
        let char_count = self.doc.char_count();
        if start > char_count || end > char_count {
            return self.edit_rejected(OtError::OtError.code());
        }

        let chars: Vec<char> = self.doc.text.chars().collect();
        let mut new_text: String = chars[..start].iter().collect();
        new_text.push_str(&edit.insert_text);
        new_text.extend(&chars[end..]);

        self.doc.text = new_text;
        self.doc.version += 1;
        let insert_len = edit.insert_text.chars().count();
        self.ot.record(self.doc.version, start, end, insert_len);

        vec![
            Outgoing::new(Recipient::Sender, Frame::new(frame_type::DOC, serde_json::to_value(&self.doc).unwrap_or_default())),
            Outgoing::new(Recipient::Peers, Frame::new(frame_type::DOC, serde_json::to_value(&self.doc).unwrap_or_default())),
        ]
    }

    fn edit_rejected(&self, code: &'static str) -> Vec<Outgoing> {
        vec![
            Outgoing::new(Recipient::Sender, Frame::error(code)),
            Outgoing::new(
                Recipient::Sender,
                Frame::new(frame_type::DOC, serde_json::to_value(&self.doc).unwrap_or_default()),
            ),
        ]
    }

    /// `spec.md` §4.4 "Cursor / chat": forwarded to peers verbatim,
    /// never mutates state.
    pub fn relay(&self, frame_type: &str, data: serde_json::Value) -> Vec<Outgoing> {
        vec![Outgoing::new(Recipient::Peers, Frame::new(frame_type, data))]
    }

    /// `spec.md` §4.4 "Language change". Empty values are ignored.
    pub fn change_language(&mut self, language: String) -> Vec<Outgoing> {
        if language.is_empty() {
            return Vec::new();
        }
        self.language = language;
        vec![Outgoing::new(
            Recipient::All,
            Frame::new(frame_type::LANGUAGE, serde_json::json!({ "language": self.language })),
        )]
    }

    /// `spec.md` §4.4 "Run command", step 1: reset run history and
    /// broadcast `run_reset` before issuing the sandbox call.
    pub fn begin_run(&mut self) -> Vec<Outgoing> {
        self.run_history.clear();
        let frame = Frame::new(frame_type::RUN_RESET, serde_json::Value::Null);
        self.run_history.push(frame.clone());
        vec![Outgoing::new(Recipient::All, frame)]
    }

    /// Converts a completed `ExecResult` into the ordered frame
    /// sequence the room broadcasts and records for replay
    /// (`spec.md` §4.4, §4.5).
    pub fn run_result_frames(&mut self, result: &ExecResult) -> Vec<Outgoing> {
        let mut frames = Vec::new();
        for event in &result.events {
            let frame = match event {
                peerdev_sandbox::ExecEvent::Stdout(text) => {
                    Frame::new(frame_type::STDOUT, serde_json::json!({ "text": text }))
                }
                peerdev_sandbox::ExecEvent::Stderr(text) => {
                    Frame::new(frame_type::STDERR, serde_json::json!({ "text": text }))
                }
            };
            frames.push(frame);
        }
        frames.push(Frame::new(
            frame_type::EXIT,
            serde_json::json!({ "code": result.exit_code, "timedOut": result.timed_out }),
        ));
        for frame in &frames {
            self.run_history.push(frame.clone());
        }
        frames.into_iter().map(|f| Outgoing::new(Recipient::All, f)).collect()
    }

    /// Run failures that never produced an `ExecResult` (sandbox
    /// unavailable, unsupported language) surface as a single `error`
    /// frame plus the mandatory final `exit`.
    pub fn run_failed_frames(&mut self, code: &'static str) -> Vec<Outgoing> {
        let error_frame = Frame::error(code);
        let exit_frame = Frame::new(frame_type::EXIT, serde_json::json!({ "code": null, "timedOut": false }));
        self.run_history.push(error_frame.clone());
        self.run_history.push(exit_frame.clone());
        vec![
            Outgoing::new(Recipient::All, error_frame),
            Outgoing::new(Recipient::All, exit_frame),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn third_join_is_rejected() {
        let mut room = Room::new("m1", 0);
        room.join("a").unwrap();
        room.join("b").unwrap();
        assert_eq!(room.join("c"), Err(RoomError::RoomFull));
    }

    #[test]
    fn rejoin_by_existing_participant_is_a_no_op() {
        let mut room = Room::new("m1", 0);
        room.join("a").unwrap();
        room.join("a").unwrap();
        assert_eq!(room.participant_count(), 1);
    }

    #[test]
    fn init_seeds_template_once() {
        let mut room = Room::new("m1", 0);
        let templates = HashMap::from([("python".to_string(), "print('hi')".to_string())]);
        room.init(None, &templates);
        assert_eq!(room.doc.text, "print('hi')");
        assert_eq!(room.doc.version, 1);
        // A second init (e.g. a second joiner) must not reseed.
        room.init(None, &templates);
        assert_eq!(room.doc.version, 1);
    }

    #[test]
    fn edit_on_empty_doc_applies_and_acks() {
        let mut room = Room::new("m1", 0);
        let edit = Edit {
            base_version: 0,
            range_start: 0,
            range_end: 0,
            insert_text: "X".to_string(),
        };
        let out = room.apply_edit(&edit);
        assert_eq!(room.doc.text, "X");
        assert_eq!(room.doc.version, 1);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|o| o.recipient == Recipient::Sender));
        assert!(out.iter().any(|o| o.recipient == Recipient::Peers));
    }

    #[test]
    fn edit_with_future_base_version_is_rejected_and_resyncs() {
        let mut room = Room::new("m1", 0);
        room.doc.text = "abc".to_string();
        room.doc.version = 3;
        let edit = Edit {
            base_version: 999,
            range_start: 0,
            range_end: 0,
            insert_text: "X".to_string(),
        };
        let out = room.apply_edit(&edit);
        assert_eq!(room.doc.text, "abc");
        assert_eq!(room.doc.version, 3);
        assert_eq!(out.len(), 2);
        let Frame { r#type, data } = &out[0].frame;
        assert_eq!(r#type, frame_type::ERROR);
        assert_eq!(data["kind"], "version_mismatch");
    }

    #[test]
    fn language_change_ignores_empty_value() {
        let mut room = Room::new("m1", 0);
        assert!(room.change_language(String::new()).is_empty());
        assert_eq!(room.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn begin_run_clears_and_records_reset() {
        let mut room = Room::new("m1", 0);
        room.run_history.push(Frame::new(frame_type::STDOUT, serde_json::json!({"text": "old"})));
        let out = room.begin_run();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame.r#type, frame_type::RUN_RESET);
        assert_eq!(room.run_history.len(), 1);
    }
}
