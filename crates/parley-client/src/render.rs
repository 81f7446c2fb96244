//! Text rendering of server frames.

use parley_proto::{MonitorMessage, ServerReply};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Terminal line for a chat reply, if it has one.
pub fn render_reply(reply: &ServerReply) -> Option<String> {
    let line = match reply {
        ServerReply::Connected => return None,
        ServerReply::NicknameAccepted(nickname) => format!("Joined as {nickname}"),
        ServerReply::Message { sender, text } => {
            format!("{sender} said: {}", String::from_utf8_lossy(text))
        },
        ServerReply::DirectMessage { sender, text } => {
            format!("[DIRECT] {sender} said: {}", String::from_utf8_lossy(text))
        },
        ServerReply::Members(members) => format!("Members: {}", members.join(", ")),
        ServerReply::MemberJoined(nickname) => format!("* {nickname} joined"),
        ServerReply::MemberLeft(nickname) => format!("* {nickname} left"),
        ServerReply::Error(error) => format!("Error: {}", error.message),
    };
    Some(line)
}

/// Terminal line for a monitor message, if it has one.
pub fn render_monitor(message: &MonitorMessage) -> Option<String> {
    match message {
        MonitorMessage::Message { sender, text } => {
            Some(format!("{sender} said: {}", String::from_utf8_lossy(text)))
        },
        MonitorMessage::DirectMessage { sender, text } => {
            Some(format!("[DIRECT] {sender} said: {}", String::from_utf8_lossy(text)))
        },
        MonitorMessage::Connect { .. } | MonitorMessage::Disconnect => None,
    }
}

/// Write `line` plus a newline and flush.
pub(crate) async fn write_line<W>(output: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}

/// Write a prompt without a newline and flush.
pub(crate) async fn write_prompt<W>(output: &mut W, prompt: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(prompt.as_bytes()).await?;
    output.flush().await
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use parley_proto::ErrorReply;

    use super::*;

    #[test]
    fn chat_lines() {
        let message = ServerReply::Message { sender: "alice".to_string(), text: Bytes::from("hi") };
        assert_eq!(render_reply(&message).as_deref(), Some("alice said: hi"));

        let direct =
            ServerReply::DirectMessage { sender: "bob".to_string(), text: Bytes::from("psst") };
        assert_eq!(render_reply(&direct).as_deref(), Some("[DIRECT] bob said: psst"));

        let members = ServerReply::Members(vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(render_reply(&members).as_deref(), Some("Members: alice, bob"));

        assert_eq!(render_reply(&ServerReply::Connected), None);
    }

    #[test]
    fn errors_show_message() {
        let error = ServerReply::Error(ErrorReply::recipient_not_found("carol"));
        let line = render_reply(&error).unwrap();
        assert!(line.starts_with("Error: "));
        assert!(line.contains("carol"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let message =
            ServerReply::Message { sender: "alice".to_string(), text: Bytes::from_static(b"\xFFok") };
        assert_eq!(render_reply(&message).as_deref(), Some("alice said: \u{FFFD}ok"));
    }

    #[test]
    fn monitor_lines() {
        let message =
            MonitorMessage::Message { sender: "alice".to_string(), text: Bytes::from("hi") };
        assert_eq!(render_monitor(&message).as_deref(), Some("alice said: hi"));

        let direct =
            MonitorMessage::DirectMessage { sender: "alice".to_string(), text: Bytes::from("yo") };
        assert_eq!(render_monitor(&direct).as_deref(), Some("[DIRECT] alice said: yo"));

        assert_eq!(render_monitor(&MonitorMessage::Disconnect), None);
    }
}
