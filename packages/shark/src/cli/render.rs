//! Plain-text rendering for command output.

use chrono::{DateTime, TimeZone};

use shark_client::ConnectionState;
use shark_client::models::{
    CallDirection, CallLogEntry, CallType, Contact, Conversation, Message, Settings,
};

pub fn conversation_header() -> String {
    format!(
        "{:<6} {:<8} {:<24} {:<6} {:>6}  {}",
        "ID", "KIND", "TITLE", "TIME", "UNREAD", "LAST"
    )
}

pub fn conversation_line(chat: &Conversation) -> String {
    let title = if chat.verified {
        format!("{} ✓", chat.title)
    } else {
        chat.title.clone()
    };
    format!(
        "{:<6} {:<8} {:<24} {:<6} {:>6}  {}",
        chat.id,
        chat.kind.as_str(),
        title,
        chat.time,
        chat.unread,
        chat.last
    )
}

pub fn message_line(message: &Message) -> String {
    let who = if message.mine { "me" } else { "them" };
    if message.status.is_empty() {
        format!("[{}] {:<4} {}", message.time, who, message.text)
    } else {
        format!(
            "[{}] {:<4} {} ({})",
            message.time, who, message.text, message.status
        )
    }
}

pub fn call_line(entry: &CallLogEntry) -> String {
    let call_type = match entry.call_type {
        CallType::Voice => "voice",
        CallType::Video => "video",
    };
    let direction = match entry.direction {
        CallDirection::Incoming => "incoming",
        CallDirection::Outgoing => "outgoing",
        CallDirection::Missed => "missed",
    };
    format!(
        "{:<20} {:<6} {:<9} {}",
        entry.name, call_type, direction, entry.time
    )
}

pub fn contact_line(contact: &Contact) -> String {
    let mark = if contact.verified { " ✓" } else { "" };
    format!("{}{} (@{})", contact.name, mark, contact.username)
}

pub fn settings_lines(settings: &Settings) -> Vec<String> {
    let on_off = |v: bool| if v { "on" } else { "off" };
    vec![
        format!("screen lock:    {}", on_off(settings.screen_lock)),
        format!("read receipts:  {}", on_off(settings.read_receipts)),
        format!("link preview:   {}", on_off(settings.link_preview)),
        format!("safety alerts:  {}", on_off(settings.safety_alerts)),
    ]
}

pub fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::Backoff => "reconnecting",
    }
}

/// Call-log display time in the backend's "Today • HH:MM" form.
pub fn today_label<Tz: TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Today • {}", now.format("%H:%M"))
}

/// Conversations in `next` that are new or differ from their entry in `prev`.
pub fn changed_conversations<'a>(prev: &[Conversation], next: &'a [Conversation]) -> Vec<&'a Conversation> {
    next.iter()
        .filter(|chat| prev.iter().find(|p| p.id == chat.id) != Some(*chat))
        .collect()
}

/// Messages to print after `shown` (ids already on screen). Returns the new
/// tail when `messages` still starts with `shown`, else the whole list.
pub fn unseen_messages<'a>(shown: &[i64], messages: &'a [Message]) -> &'a [Message] {
    let continues = messages.len() >= shown.len()
        && messages.iter().zip(shown).all(|(m, id)| m.id == *id);
    if continues {
        &messages[shown.len()..]
    } else {
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shark_client::models::ConversationKind;

    fn chat(id: i64, unread: u32, last: &str) -> Conversation {
        Conversation {
            id,
            kind: ConversationKind::Group,
            title: "Shark Team".into(),
            last: last.into(),
            time: "21:08".into(),
            unread,
            verified: true,
        }
    }

    #[test]
    fn conversation_line_marks_verified() {
        let line = conversation_line(&chat(2, 3, "Standup 10:00"));
        assert!(line.starts_with("2 "));
        assert!(line.contains("group"));
        assert!(line.contains("Shark Team ✓"));
        assert!(line.ends_with("3  Standup 10:00"));
    }

    #[test]
    fn message_line_shows_status_when_present() {
        let mut message = Message {
            id: 1,
            chat_id: 1,
            mine: true,
            text: "Done ✅".into(),
            time: "21:33".into(),
            status: "Delivered".into(),
        };
        assert_eq!(message_line(&message), "[21:33] me   Done ✅ (Delivered)");

        message.mine = false;
        message.status.clear();
        assert_eq!(message_line(&message), "[21:33] them Done ✅");
    }

    #[test]
    fn call_line_lists_type_and_direction() {
        let entry = CallLogEntry {
            id: 1,
            name: "Sara".into(),
            call_type: CallType::Video,
            direction: CallDirection::Missed,
            time: "Yesterday".into(),
        };
        let line = call_line(&entry);
        assert!(line.contains("video"));
        assert!(line.contains("missed"));
        assert!(line.ends_with("Yesterday"));
    }

    #[test]
    fn contact_line_format() {
        let contact = Contact {
            id: 1,
            name: "Sara".into(),
            username: "sara".into(),
            verified: true,
        };
        assert_eq!(contact_line(&contact), "Sara ✓ (@sara)");
    }

    #[test]
    fn settings_render_on_off() {
        let lines = settings_lines(&Settings::default());
        assert_eq!(lines[0], "screen lock:    on");
        assert_eq!(lines[2], "link preview:   off");
    }

    #[test]
    fn today_label_uses_hours_and_minutes() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 22, 10, 5).unwrap();
        assert_eq!(today_label(now), "Today • 22:10");
    }

    #[test]
    fn backoff_reads_as_reconnecting() {
        assert_eq!(state_label(ConnectionState::Backoff), "reconnecting");
    }

    #[test]
    fn changed_conversations_reports_new_and_modified() {
        let prev = vec![chat(1, 0, "a"), chat(2, 0, "b")];
        let next = vec![chat(3, 0, "new"), chat(1, 1, "hi"), chat(2, 0, "b")];
        let ids: Vec<i64> = changed_conversations(&prev, &next)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![3, 1]);
    }

    fn msg(id: i64) -> Message {
        Message {
            id,
            chat_id: 5,
            mine: false,
            text: format!("m{id}"),
            time: "22:00".into(),
            status: String::new(),
        }
    }

    fn ids(messages: &[Message]) -> Vec<i64> {
        messages.iter().map(|m| m.id).collect()
    }

    #[test]
    fn unseen_messages_is_the_appended_tail() {
        let list = vec![msg(1), msg(2), msg(3)];
        assert_eq!(ids(unseen_messages(&[1, 2], &list)), vec![3]);
        assert!(unseen_messages(&[1, 2, 3], &list).is_empty());
    }

    #[test]
    fn replaced_history_of_same_length_is_printed_again() {
        let list = vec![msg(7), msg(8)];
        assert_eq!(ids(unseen_messages(&[1, 2], &list)), vec![7, 8]);
    }

    #[test]
    fn shorter_history_is_printed_again() {
        let list = vec![msg(1)];
        assert_eq!(ids(unseen_messages(&[1, 2], &list)), vec![1]);
    }
}
