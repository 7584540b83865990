use crate::core_types::{Message, Role};

/// Keep the most recent `window` messages of a loaded history.
///
/// The kept slice never opens on a tool result whose requesting assistant
/// turn was cut off; such orphans are dropped as well.
pub fn trim_history(messages: Vec<Message>, window: Option<usize>) -> Vec<Message> {
    let Some(window) = window else {
        return messages;
    };
    if messages.len() <= window {
        return messages;
    }

    let mut start = messages.len() - window;
    while start < messages.len() && messages[start].role == Role::Tool {
        start += 1;
    }
    messages.into_iter().skip(start).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ToolCall;
    use serde_json::json;

    fn history() -> Vec<Message> {
        vec![
            Message::user("q1"),
            Message::assistant_with_calls("", vec![ToolCall::new("c1", "document_retriever", json!({"query": "q1"}))]),
            Message::tool_result("c1", "r1"),
            Message::assistant("a1"),
            Message::user("q2"),
            Message::assistant("a2"),
        ]
    }

    #[test]
    fn test_no_window_keeps_everything() {
        assert_eq!(trim_history(history(), None).len(), 6);
        assert_eq!(trim_history(history(), Some(10)).len(), 6);
    }

    #[test]
    fn test_keeps_most_recent() {
        let trimmed = trim_history(history(), Some(2));
        assert_eq!(trimmed[0].content, "q2");
        assert_eq!(trimmed[1].content, "a2");
    }

    #[test]
    fn test_never_starts_on_orphaned_tool_result() {
        let trimmed = trim_history(history(), Some(4));
        assert_eq!(trimmed.len(), 3);
        assert_eq!(trimmed[0].content, "a1");
    }
}
