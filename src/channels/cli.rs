//! CLI channel: stdin/stdout REPL for local testing.
//!
//! Input lines:
//! - `/command` runs a command
//! - `doc <file name>` submits a document
//! - `press <callback id>` presses a button
//! - anything else is free text

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, Command, EventKind, EventStream, InboundEvent, Reply, ReplyMode};
use crate::error::ChannelError;

/// User id for everything typed at the terminal.
const CLI_USER_ID: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Debug, Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<EventStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            eprint!("> ");
                            continue;
                        }
                        let kind = match parse_line(line) {
                            Ok(kind) => kind,
                            Err(e) => {
                                eprintln!("{e}");
                                eprint!("> ");
                                continue;
                            }
                        };
                        if tx.send(InboundEvent::new(CLI_USER_ID, kind)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn deliver(
        &self,
        _event: &InboundEvent,
        replies: Vec<Reply>,
    ) -> Result<(), ChannelError> {
        for reply in &replies {
            println!("\n{}\n", render_reply(reply));
        }
        eprint!("> ");
        Ok(())
    }
}

/// Turn one input line into an event kind.
fn parse_line(line: &str) -> Result<EventKind, String> {
    if let Some(command) = Command::parse(line) {
        return Ok(EventKind::Command(command));
    }

    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match word {
        "doc" if rest.is_empty() => Err("usage: doc <file name>".into()),
        "doc" => Ok(EventKind::Document {
            name: rest.to_string(),
            mime_type: None,
            size: None,
        }),
        "press" if rest.is_empty() => Err("usage: press <callback id>".into()),
        "press" => rest.parse().map(EventKind::Button),
        _ => Ok(EventKind::Text(line.to_string())),
    }
}

/// Reply text followed by one line per button row.
fn render_reply(reply: &Reply) -> String {
    let mut out = match reply.mode {
        ReplyMode::Send => reply.text.clone(),
        ReplyMode::Edit => format!("(edited) {}", reply.text),
    };
    if let Some(keyboard) = &reply.keyboard {
        for row in &keyboard.rows {
            let buttons: Vec<String> = row
                .iter()
                .map(|b| format!("[{}: press {}]", b.label, b.action))
                .collect();
            out.push('\n');
            out.push_str(&buttons.join("  "));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{Button, CallbackAction, Keyboard};

    #[test]
    fn cli_channel_name() {
        assert_eq!(CliChannel::new().name(), "cli");
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_line("/my_profile").unwrap(),
            EventKind::Command(Command::MyProfile)
        );
        assert_eq!(parse_line("/done").unwrap(), EventKind::Command(Command::Done));
    }

    #[test]
    fn parses_document_with_spaces_in_name() {
        assert_eq!(
            parse_line("doc My CV 2024.pdf").unwrap(),
            EventKind::Document {
                name: "My CV 2024.pdf".into(),
                mime_type: None,
                size: None,
            }
        );
        assert!(parse_line("doc").is_err());
    }

    #[test]
    fn parses_button_presses() {
        assert_eq!(
            parse_line("press edit:email").unwrap(),
            EventKind::Button(CallbackAction::EditField("email".into()))
        );
        assert_eq!(
            parse_line("press confirm").unwrap(),
            EventKind::Button(CallbackAction::Confirm)
        );
        assert!(parse_line("press launch_missiles").is_err());
        assert!(parse_line("press").is_err());
    }

    #[test]
    fn everything_else_is_text() {
        assert_eq!(
            parse_line("email: jane@example.org").unwrap(),
            EventKind::Text("email: jane@example.org".into())
        );
        assert_eq!(
            parse_line("document please").unwrap(),
            EventKind::Text("document please".into())
        );
    }

    #[test]
    fn renders_buttons_under_text() {
        let reply = Reply::edit("Pick one").with_keyboard(
            Keyboard::new().row(vec![
                Button::new("Confirm profile", CallbackAction::Confirm),
                Button::new("Discard", CallbackAction::Discard),
            ]),
        );
        assert_eq!(
            render_reply(&reply),
            "(edited) Pick one\n[Confirm profile: press confirm]  [Discard: press discard]"
        );
        assert_eq!(render_reply(&Reply::send("hi")), "hi");
    }
}
