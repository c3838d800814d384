//! Line commands for driving a headless shell from stdin
//!
//! ```text
//! push {"notification":{"title":"Sale","body":"50% off"},"data":{"url":"..."}}
//! broadcast {"title":"Hi","message":"..."}
//! open https://store.example.com/products/1
//! tap push:1a2b3c4d5e6f7a8b
//! page started | finished | error | subframe-error
//! link https://instagram.com/store
//! fire welcome_back
//! retry | refresh | reload | quit
//! ```

use std::collections::HashMap;

use crate::gateway::{Broadcast, RawEvent, RemotePush};
use crate::intent::Intent;
use crate::shell::{PageEvent, ShellEvent};

/// Parse one input line. Blank lines and `#` comments yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ShellEvent>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    let event = match command {
        "push" => {
            let push: RemotePush = serde_json::from_str(required(command, rest)?)
                .map_err(|e| format!("Invalid push payload: {}", e))?;
            ShellEvent::Inbound(RawEvent::RemotePush(push))
        }
        "broadcast" => {
            let extras: HashMap<String, String> = serde_json::from_str(required(command, rest)?)
                .map_err(|e| format!("Invalid broadcast extras: {}", e))?;
            ShellEvent::Inbound(RawEvent::Broadcast(Broadcast { extras }))
        }
        "open" => ShellEvent::Foreground {
            intent: Some(Intent::view(required(command, rest)?)),
            cold_start: false,
        },
        "tap" => ShellEvent::NotificationTapped(required(command, rest)?.to_string()),
        "fire" => ShellEvent::AlarmFired(required(command, rest)?.to_string()),
        "link" => ShellEvent::LinkActivated(required(command, rest)?.to_string()),
        "page" => ShellEvent::Page(match rest {
            "started" => PageEvent::Started,
            "finished" => PageEvent::Finished,
            "error" => PageEvent::Error { main_frame: true },
            "subframe-error" => PageEvent::Error { main_frame: false },
            other => return Err(format!("Unknown page event '{}'", other)),
        }),
        "retry" => ShellEvent::Retry,
        "refresh" => ShellEvent::Refresh,
        "reload" => ShellEvent::ReloadRequested,
        "quit" | "exit" => ShellEvent::Shutdown,
        other => return Err(format!("Unknown command '{}'", other)),
    };

    Ok(Some(event))
}

fn required<'a>(command: &str, rest: &'a str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("'{}' needs an argument", command))
    } else {
        Ok(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("# setup").unwrap(), None);
    }

    #[test]
    fn test_push_line() {
        let event = parse_command(
            r#"push {"notification":{"title":"Sale","body":"50% off"},"data":{"url":"https://s.com/x"}}"#,
        )
        .unwrap()
        .unwrap();

        match event {
            ShellEvent::Inbound(RawEvent::RemotePush(push)) => {
                assert_eq!(push.data.get("url").map(String::as_str), Some("https://s.com/x"));
                assert_eq!(push.notification.unwrap().title.as_deref(), Some("Sale"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_line() {
        let event = parse_command(r#"broadcast {"message":"Back in stock"}"#).unwrap().unwrap();
        match event {
            ShellEvent::Inbound(RawEvent::Broadcast(b)) => {
                assert_eq!(b.extras.get("message").map(String::as_str), Some("Back in stock"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(
            parse_command("open https://store.myshop.com/a").unwrap(),
            Some(ShellEvent::Foreground {
                intent: Some(Intent::view("https://store.myshop.com/a")),
                cold_start: false,
            })
        );
        assert_eq!(
            parse_command("page subframe-error").unwrap(),
            Some(ShellEvent::Page(PageEvent::Error { main_frame: false }))
        );
        assert_eq!(
            parse_command("tap welcome_back").unwrap(),
            Some(ShellEvent::NotificationTapped("welcome_back".to_string()))
        );
        assert_eq!(parse_command("quit").unwrap(), Some(ShellEvent::Shutdown));
        assert_eq!(parse_command("reload").unwrap(), Some(ShellEvent::ReloadRequested));
    }

    #[test]
    fn test_bad_lines() {
        assert!(parse_command("open").is_err());
        assert!(parse_command("page exploded").is_err());
        assert!(parse_command("push {not json").is_err());
        assert!(parse_command("dance").is_err());
    }
}
