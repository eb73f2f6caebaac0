use colored::Colorize;
use lib_livefeed::{FeedMessage, MessageSnapshot};
use std::collections::HashSet;
use std::sync::Mutex;

/// Remembers which ids of the window were already shown, so each delivery
/// prints only the messages that are new to this terminal.
#[derive(Default)]
pub struct NewMessages {
    seen: Mutex<HashSet<String>>,
}

impl NewMessages {
    /// Returns the messages of `window` not present in the previous window,
    /// oldest first, and remembers `window` as the new baseline.
    pub fn diff(&self, window: &MessageSnapshot) -> Vec<FeedMessage> {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let fresh = window
            .iter()
            .filter(|m| !seen.contains(&m.id))
            .cloned()
            .collect();
        *seen = window.iter().map(|m| m.id.clone()).collect();
        fresh
    }

    pub fn print(&self, window: &MessageSnapshot) {
        for message in self.diff(window) {
            println!("{}", render(&message));
        }
    }
}

pub fn render(message: &FeedMessage) -> String {
    format!(
        "[{}] {}: {}",
        message.sent_at.as_str().dimmed(),
        message.sender_name.as_str().bold(),
        message.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn window(ids: &[&str]) -> MessageSnapshot {
        ids.iter()
            .map(|id| FeedMessage::new(*id, "ann", format!("hi {}", id), "10:00"))
            .collect::<Vec<_>>()
            .into()
    }

    fn ids(messages: Vec<FeedMessage>) -> Vec<String> {
        messages.into_iter().map(|m| m.id).collect()
    }

    #[test]
    fn only_new_ids_are_reported() {
        let printer = NewMessages::default();
        assert_eq!(ids(printer.diff(&window(&["a", "b"]))), vec!["a", "b"]);
        assert_eq!(ids(printer.diff(&window(&["a", "b", "c"]))), vec!["c"]);
        // The window slid: "a" fell out, "d" came in.
        assert_eq!(ids(printer.diff(&window(&["b", "c", "d"]))), vec!["d"]);
    }

    #[test]
    fn cleared_window_resets_the_baseline() {
        let printer = NewMessages::default();
        printer.diff(&window(&["a"]));
        assert!(printer.diff(&Arc::from(Vec::new())).is_empty());
        assert_eq!(ids(printer.diff(&window(&["a"]))), vec!["a"]);
    }

    #[test]
    fn render_includes_sender_and_text() {
        colored::control::set_override(false);
        let line = render(&FeedMessage::new("1", "ann", "hello", "10:00"));
        assert_eq!(line, "[10:00] ann: hello");
    }
}
