//! History formatting
//!
//! Converts stored (role, content) rows into the typed `Turn` sequence the
//! agents consume, and renders a history into the flattened text block that
//! gets injected into prompts. Rendering is pure: it never reorders, drops,
//! or mutates turns.

use sdk::types::Turn;

/// Prompt label for user-authored lines
pub const HUMAN_LABEL: &str = "Người dùng";

/// Prompt label for assistant-authored lines
pub const ASSISTANT_LABEL: &str = "Trợ lý";

/// Sentinel rendered for an empty history
pub const NO_HISTORY: &str = "Không có lịch sử trò chuyện.";

/// Map stored rows to typed turns, preserving order exactly as stored.
///
/// Any role tag other than "human" is treated as assistant output; the
/// schema constrains the column to the two known tags, so this arm only
/// matters for data written by older revisions.
pub fn to_history(messages: Vec<(String, String)>) -> Vec<Turn> {
    messages
        .into_iter()
        .map(|(role, content)| match role.as_str() {
            "human" => Turn::Human(content),
            _ => Turn::Assistant(content),
        })
        .collect()
}

/// Render a history as one prompt-ready text block, one labeled line per
/// turn, in order.
pub fn to_prompt_text(history: &[Turn]) -> String {
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }

    history
        .iter()
        .map(|turn| match turn {
            Turn::Human(content) => format!("{HUMAN_LABEL}: {content}"),
            Turn::Assistant(content) => format!("{ASSISTANT_LABEL}: {content}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_to_history_preserves_order_and_role() {
        let stored = vec![
            ("human".to_string(), "Hi".to_string()),
            ("assistant".to_string(), "Hello".to_string()),
            ("human".to_string(), "明日".to_string()),
        ];

        let history = to_history(stored);
        assert_eq!(
            history,
            vec![
                Turn::human("Hi"),
                Turn::assistant("Hello"),
                Turn::human("明日"),
            ]
        );
    }

    #[test]
    fn test_unknown_role_falls_back_to_assistant() {
        let history = to_history(vec![("ai".to_string(), "legacy".to_string())]);
        assert_eq!(history, vec![Turn::assistant("legacy")]);
    }

    #[test]
    fn test_empty_history_sentinel() {
        assert_eq!(to_prompt_text(&[]), NO_HISTORY);
    }

    #[test]
    fn test_prompt_text_labels_lines_in_order() {
        let history = vec![
            Turn::human("Lộ trình học N3?"),
            Turn::assistant("Bạn đang ở trình độ nào?"),
        ];

        assert_eq!(
            to_prompt_text(&history),
            "Người dùng: Lộ trình học N3?\nTrợ lý: Bạn đang ở trình độ nào?"
        );
    }

    proptest! {
        // Rendering never drops or reorders turns: line count matches turn
        // count (for newline-free contents) and each line carries its turn's
        // content, in order.
        #[test]
        fn test_prompt_text_is_lossless_in_order(
            contents in proptest::collection::vec("[^\\n\\r]{0,40}", 1..12),
            roles in proptest::collection::vec(any::<bool>(), 12)
        ) {
            let history: Vec<Turn> = contents
                .iter()
                .zip(roles.iter())
                .map(|(c, human)| {
                    if *human {
                        Turn::human(c.clone())
                    } else {
                        Turn::assistant(c.clone())
                    }
                })
                .collect();

            let text = to_prompt_text(&history);
            let lines: Vec<&str> = text.split('\n').collect();

            prop_assert_eq!(lines.len(), history.len());
            for (line, turn) in lines.iter().zip(history.iter()) {
                let label = match turn {
                    Turn::Human(_) => HUMAN_LABEL,
                    Turn::Assistant(_) => ASSISTANT_LABEL,
                };
                prop_assert_eq!(*line, format!("{}: {}", label, turn.content()));
            }

            // Pure and idempotent: a second render is byte-identical
            prop_assert_eq!(to_prompt_text(&history), text);
        }
    }
}
