//! Chat log reconciliation.
//!
//! The SDK pushes the whole chat log on every change, unordered and without
//! ids. The reconciler turns each push into the display list: intro first,
//! restored history merged with the live log by text, and a loading
//! placeholder while the avatar has not answered the last user turn.

use std::collections::HashSet;

use raon_core::types::{ChatLogEntry, DisplayId, DisplayMessage, RestoredMessage, Timestamp};

/// Outcome of one chat log push.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub messages: Vec<DisplayMessage>,
    /// Assistant texts not seen in an earlier push, oldest first.
    pub new_assistant_messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatLogReconciler {
    intro_message: String,
    intro_timestamp: i64,
    restored: Option<Vec<RestoredMessage>>,
    restore_consumed: bool,
    seen_len: usize,
}

impl ChatLogReconciler {
    pub fn new(intro_message: impl Into<String>) -> Self {
        Self {
            intro_message: intro_message.into(),
            intro_timestamp: Timestamp::now().0,
            restored: None,
            restore_consumed: false,
            seen_len: 0,
        }
    }

    /// Start over for a new session.
    pub fn reset(&mut self, intro_message: impl Into<String>) {
        *self = Self::new(intro_message);
    }

    pub fn intro_message(&self) -> &str {
        &self.intro_message
    }

    /// Supply restored history. Accepted once per session; ignored after
    /// the first supply or once live entries consumed it.
    pub fn restore(&mut self, history: Vec<RestoredMessage>) -> bool {
        if self.restore_consumed || self.restored.is_some() {
            tracing::debug!("Restored history already applied; ignoring");
            return false;
        }
        tracing::debug!(count = history.len(), "Restored history loaded");
        self.restored = Some(history);
        true
    }

    /// Whether restored history is still waiting to be merged.
    pub fn has_pending_restore(&self) -> bool {
        self.restored.as_ref().is_some_and(|r| !r.is_empty())
    }

    /// The list to show before the first live push.
    pub fn initial_display(&self) -> Vec<DisplayMessage> {
        let mut messages = vec![DisplayMessage::intro(
            &self.intro_message,
            self.intro_timestamp,
        )];
        if let Some(restored) = &self.restored {
            messages.extend(
                restored
                    .iter()
                    .filter(|m| !is_intro(m))
                    .map(DisplayMessage::from),
            );
        }
        messages
    }

    /// Reconcile one full chat log push.
    pub fn reconcile(&mut self, entries: &[ChatLogEntry]) -> Reconciliation {
        let mut sorted = entries.to_vec();
        sorted.sort_by_key(|e| e.timestamp);

        let new_assistant_messages: Vec<String> = sorted
            .iter()
            .skip(self.seen_len)
            .filter(|e| !e.is_user)
            .map(|e| e.text.clone())
            .collect();
        self.seen_len = self.seen_len.max(sorted.len());

        let live: Vec<DisplayMessage> = sorted
            .iter()
            .enumerate()
            .map(|(index, entry)| live_message(index, entry))
            .collect();

        let body = match self.restored.take() {
            Some(restored) if !restored.is_empty() => {
                let merged = merge(&restored, live);
                if sorted.is_empty() {
                    self.restored = Some(restored);
                } else {
                    tracing::debug!("Restored history merged into live chat log");
                    self.restore_consumed = true;
                }
                merged
            }
            other => {
                self.restored = other;
                live
            }
        };

        let mut messages = Vec::with_capacity(body.len() + 2);
        messages.push(DisplayMessage::intro(
            &self.intro_message,
            self.intro_timestamp,
        ));
        messages.extend(body);
        if let Some(last) = sorted.last().filter(|e| e.is_user) {
            messages.push(DisplayMessage::loading(last.timestamp));
        }

        Reconciliation {
            messages,
            new_assistant_messages,
        }
    }
}

fn is_intro(message: &RestoredMessage) -> bool {
    message.id == "0"
}

fn live_message(index: usize, entry: &ChatLogEntry) -> DisplayMessage {
    DisplayMessage {
        id: DisplayId::Message(format!("{}-{}", entry.timestamp, index)),
        role: entry.role(),
        text: entry.text.clone(),
        timestamp: entry.timestamp,
        time: Timestamp(entry.timestamp).clock_label(),
    }
}

/// Restored messages first, then live messages whose text is new; stable
/// sort keeps restored ahead of live on equal timestamps.
fn merge(restored: &[RestoredMessage], live: Vec<DisplayMessage>) -> Vec<DisplayMessage> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged: Vec<DisplayMessage> = Vec::with_capacity(restored.len() + live.len());

    for message in restored.iter().filter(|m| !is_intro(m)) {
        seen.insert(message.text.clone());
        merged.push(DisplayMessage::from(message));
    }
    for message in live {
        if seen.insert(message.text.clone()) {
            merged.push(message);
        }
    }

    merged.sort_by_key(|m| m.timestamp);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use raon_core::types::Role;

    fn entry(text: &str, is_user: bool, timestamp: i64) -> ChatLogEntry {
        ChatLogEntry {
            text: text.into(),
            is_user,
            timestamp,
        }
    }

    fn restored(id: &str, role: Role, text: &str, timestamp: i64) -> RestoredMessage {
        RestoredMessage {
            id: id.into(),
            role,
            text: text.into(),
            timestamp,
        }
    }

    fn texts(messages: &[DisplayMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.text.as_str()).collect()
    }

    #[test]
    fn test_unordered_log_is_sorted_with_intro_and_loading() {
        let mut rec = ChatLogReconciler::new("Hello there");
        let out = rec.reconcile(&[entry("hi", true, 2), entry("hello", false, 1)]);

        let ids: Vec<&DisplayId> = out.messages.iter().map(|m| &m.id).collect();
        assert_eq!(ids[0], &DisplayId::Intro);
        assert_eq!(ids[3], &DisplayId::Loading);
        assert_eq!(texts(&out.messages), vec!["Hello there", "hello", "hi", ""]);
        assert_eq!(out.messages[1].role, Role::Ai);
        assert_eq!(out.messages[2].role, Role::User);
    }

    #[test]
    fn test_no_loading_after_assistant_or_empty_log() {
        let mut rec = ChatLogReconciler::new("intro");
        let out = rec.reconcile(&[]);
        assert_eq!(out.messages.len(), 1);

        let out = rec.reconcile(&[entry("q", true, 1), entry("a", false, 2)]);
        assert!(out.messages.iter().all(|m| m.id != DisplayId::Loading));
    }

    #[test]
    fn test_new_assistant_messages_reported_once() {
        let mut rec = ChatLogReconciler::new("intro");
        let first = rec.reconcile(&[entry("hello", false, 1)]);
        assert_eq!(first.new_assistant_messages, vec!["hello"]);

        let second = rec.reconcile(&[entry("hello", false, 1), entry("hi", true, 2)]);
        assert!(second.new_assistant_messages.is_empty());

        let third = rec.reconcile(&[
            entry("hello", false, 1),
            entry("hi", true, 2),
            entry("How can I help?", false, 3),
        ]);
        assert_eq!(third.new_assistant_messages, vec!["How can I help?"]);
    }

    #[test]
    fn test_restored_history_merges_by_text_then_clears() {
        let mut rec = ChatLogReconciler::new("intro");
        assert!(rec.restore(vec![
            restored("0", Role::Ai, "intro", 0),
            restored("11", Role::Ai, "Tell me about yourself.", 10),
            restored("12", Role::User, "I build backends.", 20),
        ]));
        assert_eq!(
            texts(&rec.initial_display()),
            vec!["intro", "Tell me about yourself.", "I build backends."]
        );

        // Before any live entry the history stays pending.
        rec.reconcile(&[]);
        assert!(rec.has_pending_restore());

        let out = rec.reconcile(&[
            entry("I build backends.", true, 30),
            entry("What stack?", false, 40),
        ]);
        assert_eq!(
            texts(&out.messages),
            vec![
                "intro",
                "Tell me about yourself.",
                "I build backends.",
                "What stack?"
            ]
        );
        assert_eq!(out.messages[2].id, DisplayId::Message("12".into()));
        assert!(!rec.has_pending_restore());

        // One-shot: later pushes show the live log only, and history
        // cannot be re-applied.
        assert!(!rec.restore(vec![restored("11", Role::Ai, "again", 1)]));
        let out = rec.reconcile(&[entry("What stack?", false, 40)]);
        assert_eq!(texts(&out.messages), vec!["intro", "What stack?"]);
    }

    #[test]
    fn test_merge_keeps_restored_before_live_on_tie() {
        let mut rec = ChatLogReconciler::new("intro");
        rec.restore(vec![restored("5", Role::User, "old", 100)]);
        let out = rec.reconcile(&[entry("new", false, 100)]);
        assert_eq!(texts(&out.messages), vec!["intro", "old", "new"]);
    }

    #[test]
    fn test_identical_live_texts_collapse_during_merge() {
        let mut rec = ChatLogReconciler::new("intro");
        rec.restore(vec![restored("1", Role::Ai, "Ready?", 1)]);
        let out = rec.reconcile(&[
            entry("yes", true, 2),
            entry("Ready?", false, 3),
            entry("yes", true, 4),
        ]);
        assert_eq!(texts(&out.messages), vec!["intro", "Ready?", "yes", ""]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut rec = ChatLogReconciler::new("intro");
        rec.restore(vec![restored("1", Role::Ai, "x", 1)]);
        rec.reconcile(&[entry("a", false, 1)]);

        rec.reset("Welcome back");
        assert_eq!(rec.intro_message(), "Welcome back");
        assert!(rec.restore(vec![restored("2", Role::Ai, "y", 1)]));
        let out = rec.reconcile(&[entry("a", false, 1)]);
        assert_eq!(out.new_assistant_messages, vec!["a"]);
    }
}
