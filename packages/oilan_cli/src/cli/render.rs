use oilan_client::{ConnectionState, Dialog, DisplayEvent, Role};

/// Text for one display event, or `None` when the terminal shows nothing for it.
pub fn format_event(event: &DisplayEvent) -> Option<String> {
    match event {
        DisplayEvent::Reset { dialog } => Some(format!("\n=== dialog {dialog} ===")),
        DisplayEvent::Message(message) => {
            let prefix = match message.role {
                Role::User => "you>",
                Role::Assistant => "ai>",
            };
            Some(format!("{prefix} {}", message.content))
        }
        DisplayEvent::Status(state) => match state {
            ConnectionState::Connecting => Some("[oilan: connecting...]".to_string()),
            ConnectionState::Open => Some("[oilan: connected]".to_string()),
            ConnectionState::Closed => Some("[oilan: disconnected]".to_string()),
            ConnectionState::Closing => None,
        },
        DisplayEvent::Notice(notice) => Some(format!("[oilan: {}]", notice.text)),
        // Input is line-buffered; gating is enforced by the session
        DisplayEvent::Input { .. } => None,
        DisplayEvent::Dialogs(dialogs) => Some(format_dialogs(dialogs)),
    }
}

/// Dialog table, most recent first.
pub fn format_dialogs(dialogs: &[Dialog]) -> String {
    if dialogs.is_empty() {
        return "No dialogs yet.".to_string();
    }
    let mut out = format!("{:<8} {}\n", "ID", "TITLE");
    out.push_str(&"-".repeat(40));
    for dialog in dialogs {
        let title = if dialog.title.is_empty() {
            "(untitled)"
        } else {
            dialog.title.as_str()
        };
        out.push_str(&format!("\n{:<8} {}", dialog.id, title));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use oilan_client::{DialogId, Message, Notice, NoticeKind};

    fn dialog(id: i64, title: &str) -> Dialog {
        Dialog {
            id: DialogId::from(id),
            title: title.to_string(),
        }
    }

    #[test]
    fn messages_are_prefixed_by_role() {
        assert_eq!(
            format_event(&DisplayEvent::Message(Message::user("hi"))).as_deref(),
            Some("you> hi")
        );
        assert_eq!(
            format_event(&DisplayEvent::Message(Message::assistant("hello"))).as_deref(),
            Some("ai> hello")
        );
    }

    #[test]
    fn notices_and_status_are_bracketed() {
        let notice = Notice::new(NoticeKind::ConnectionClosed, "Connection has been closed.");
        assert_eq!(
            format_event(&DisplayEvent::Notice(notice)).as_deref(),
            Some("[oilan: Connection has been closed.]")
        );
        assert_eq!(
            format_event(&DisplayEvent::Status(ConnectionState::Open)).as_deref(),
            Some("[oilan: connected]")
        );
        assert_eq!(
            format_event(&DisplayEvent::Status(ConnectionState::Closing)),
            None
        );
    }

    #[test]
    fn input_changes_print_nothing() {
        assert_eq!(format_event(&DisplayEvent::Input { enabled: true }), None);
    }

    #[test]
    fn reset_names_the_dialog() {
        let text = format_event(&DisplayEvent::Reset {
            dialog: DialogId::from(7),
        })
        .unwrap();
        assert!(text.ends_with("=== dialog 7 ==="));
    }

    #[test]
    fn dialog_table() {
        let table = format_dialogs(&[dialog(12, "Trip planning"), dialog(3, "")]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ID"));
        assert_eq!(lines[2], "12       Trip planning");
        assert_eq!(lines[3], "3        (untitled)");
    }

    #[test]
    fn empty_dialog_table() {
        assert_eq!(format_dialogs(&[]), "No dialogs yet.");
    }
}
