//! Relay slash-command parsing and registration payload helpers.

use serde_json::{json, Value};

use super::RelayCommand;

pub(super) fn relay_command_usage() -> String {
    [
        "Supported commands:",
        "- `/ping`",
        "- `/user-id [@user]`",
        "- `/summarize text <text>`",
        "- `/summarize last <n> [@user]`",
        "- `/summarize link <url>`",
    ]
    .join("\n")
}

/// Command definitions pushed to the application command endpoint at startup.
pub(super) fn command_registration_payload() -> Value {
    json!([
        {
            "name": "ping",
            "description": "Replies with pong",
            "type": 1,
        },
        {
            "name": "user-id",
            "description": "Sends the user id for a given user",
            "type": 1,
        },
        {
            "name": "summarize",
            "description": "Summarize text, recent messages, or a link",
            "type": 1,
        },
    ])
}

/// Extracts a user id from a raw id or a `<@id>` / `<@!id>` mention.
pub(super) fn parse_user_mention(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<@!")
        .or_else(|| trimmed.strip_prefix("<@"))
        .and_then(|value| value.strip_suffix('>'))
        .unwrap_or(trimmed);
    if !inner.is_empty() && inner.chars().all(|ch| ch.is_ascii_digit()) {
        return Some(inner.to_string());
    }
    None
}

pub(super) fn parse_relay_command(text: &str) -> Option<RelayCommand> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let remainder = parts.next().unwrap_or_default().trim();

    let parsed = match command {
        "/ping" => {
            if remainder.is_empty() {
                RelayCommand::Ping
            } else {
                RelayCommand::Invalid {
                    message: "Usage: /ping".to_string(),
                }
            }
        }
        "/user-id" => {
            if remainder.is_empty() {
                RelayCommand::UserId { target: None }
            } else {
                match parse_user_mention(remainder) {
                    Some(target) => RelayCommand::UserId {
                        target: Some(target),
                    },
                    None => RelayCommand::Invalid {
                        message: "Usage: /user-id [@user]".to_string(),
                    },
                }
            }
        }
        "/summarize" => parse_summarize_command(remainder),
        _ => RelayCommand::Invalid {
            message: format!("Unknown command `{}`.\n\n{}", command, relay_command_usage()),
        },
    };
    Some(parsed)
}

fn parse_summarize_command(args: &str) -> RelayCommand {
    if args.is_empty() {
        return RelayCommand::Invalid {
            message: "Usage: /summarize <text|last|link> ...".to_string(),
        };
    }

    let mut parts = args.splitn(2, char::is_whitespace);
    let mode = parts.next().unwrap_or_default();
    let remainder = parts.next().unwrap_or_default().trim();
    match mode {
        "text" => {
            if remainder.is_empty() {
                RelayCommand::Invalid {
                    message: "Usage: /summarize text <text>".to_string(),
                }
            } else {
                RelayCommand::SummarizeText {
                    text: remainder.to_string(),
                }
            }
        }
        "last" => {
            let mut pieces = remainder.split_whitespace();
            let count = pieces.next().and_then(|value| value.parse::<usize>().ok());
            let user = pieces.next().map(parse_user_mention);
            let extra = pieces.next();
            match (count, user, extra) {
                (Some(count), None, None) if count > 0 => {
                    RelayCommand::SummarizeLast { count, user: None }
                }
                (Some(count), Some(Some(user)), None) if count > 0 => RelayCommand::SummarizeLast {
                    count,
                    user: Some(user),
                },
                _ => RelayCommand::Invalid {
                    message: "Usage: /summarize last <n> [@user]".to_string(),
                },
            }
        }
        "link" => {
            if remainder.is_empty() || remainder.split_whitespace().count() != 1 {
                RelayCommand::Invalid {
                    message: "Usage: /summarize link <url>".to_string(),
                }
            } else {
                RelayCommand::SummarizeLink {
                    url: remainder.to_string(),
                }
            }
        }
        _ => RelayCommand::Invalid {
            message: "Usage: /summarize <text|last|link> ...".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::RelayCommand;
    use super::{command_registration_payload, parse_relay_command, parse_user_mention};

    #[test]
    fn unit_plain_chat_is_not_a_command() {
        assert_eq!(parse_relay_command("hello there"), None);
        assert_eq!(parse_relay_command("  what is rust?"), None);
    }

    #[test]
    fn unit_parse_user_mention_accepts_raw_ids_and_mentions() {
        assert_eq!(parse_user_mention("123"), Some("123".to_string()));
        assert_eq!(parse_user_mention("<@456>"), Some("456".to_string()));
        assert_eq!(parse_user_mention("<@!789>"), Some("789".to_string()));
        assert_eq!(parse_user_mention("<@abc>"), None);
        assert_eq!(parse_user_mention("someone"), None);
    }

    #[test]
    fn functional_ping_and_user_id_parse_with_strict_arguments() {
        assert_eq!(parse_relay_command("/ping"), Some(RelayCommand::Ping));
        assert!(matches!(
            parse_relay_command("/ping extra"),
            Some(RelayCommand::Invalid { .. })
        ));
        assert_eq!(
            parse_relay_command("/user-id"),
            Some(RelayCommand::UserId { target: None })
        );
        assert_eq!(
            parse_relay_command("/user-id <@42>"),
            Some(RelayCommand::UserId {
                target: Some("42".to_string())
            })
        );
    }

    #[test]
    fn functional_summarize_variants_parse() {
        assert_eq!(
            parse_relay_command("/summarize text the quick brown fox"),
            Some(RelayCommand::SummarizeText {
                text: "the quick brown fox".to_string()
            })
        );
        assert_eq!(
            parse_relay_command("/summarize last 5"),
            Some(RelayCommand::SummarizeLast {
                count: 5,
                user: None
            })
        );
        assert_eq!(
            parse_relay_command("/summarize last 3 <@99>"),
            Some(RelayCommand::SummarizeLast {
                count: 3,
                user: Some("99".to_string())
            })
        );
        assert_eq!(
            parse_relay_command("/summarize link https://example.com"),
            Some(RelayCommand::SummarizeLink {
                url: "https://example.com".to_string()
            })
        );
    }

    #[test]
    fn regression_summarize_last_rejects_zero_and_garbage_counts() {
        assert!(matches!(
            parse_relay_command("/summarize last 0"),
            Some(RelayCommand::Invalid { .. })
        ));
        assert!(matches!(
            parse_relay_command("/summarize last many"),
            Some(RelayCommand::Invalid { .. })
        ));
        assert!(matches!(
            parse_relay_command("/summarize last 2 nobody"),
            Some(RelayCommand::Invalid { .. })
        ));
    }

    #[test]
    fn unit_registration_payload_lists_every_command() {
        let payload = command_registration_payload();
        let names: Vec<&str> = payload
            .as_array()
            .expect("payload array")
            .iter()
            .filter_map(|entry| entry.get("name").and_then(|name| name.as_str()))
            .collect();
        assert_eq!(names, vec!["ping", "user-id", "summarize"]);
    }
}
