//! Command line parsing
//!
//! Grammar (verbs, fields and operators are case-insensitive):
//!
//! ```text
//! HELP
//! STATS
//! QUIT
//! FIND name contains <text>
//! FIND ext is <extension>        (also: FIND extension is ...)
//! FIND size > <bytes>
//! FIND size < <bytes>
//! ```
//!
//! A FIND line is split into at most four whitespace-separated tokens; the
//! fourth is the operand, taken verbatim including inner whitespace.

use crate::db::SizeComparison;
use crate::error::ProtocolError;
use std::fmt;
use std::str::FromStr;

/// Maximum number of tokens in a FIND line
const FIND_TOKENS: usize = 4;

/// One parsed client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Stats,
    Quit,
    Find(Query),
}

/// A filter over indexed records
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Path contains the text
    NameContains(String),

    /// Extension equals the text (lowercase, no leading dot)
    ExtensionIs(String),

    /// Size strictly above or below a threshold
    Size {
        direction: SizeComparison,
        bytes: i64,
    },
}

impl Command {
    /// Parse one line of client input
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim();
        let tokens = split_tokens(line, FIND_TOKENS);

        let verb = match tokens.first() {
            Some(verb) => verb.to_ascii_uppercase(),
            None => return Err(ProtocolError::UnknownCommand(String::new())),
        };

        match (verb.as_str(), tokens.len()) {
            ("HELP", 1) => Ok(Command::Help),
            ("STATS", 1) => Ok(Command::Stats),
            ("QUIT", 1) => Ok(Command::Quit),
            ("FIND", n) if n < FIND_TOKENS => Err(ProtocolError::FindSyntax),
            ("FIND", _) => Query::from_parts(tokens[1], tokens[2], tokens[3]).map(Command::Find),
            _ => Err(ProtocolError::UnknownCommand(line.to_string())),
        }
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::parse(s)
    }
}

impl Query {
    fn from_parts(field: &str, operator: &str, operand: &str) -> Result<Self, ProtocolError> {
        let field = field.to_ascii_lowercase();
        let operator = operator.to_ascii_lowercase();

        let invalid_operator = |expected: &'static str| ProtocolError::InvalidOperator {
            field: field.clone(),
            operator: operator.clone(),
            expected,
        };

        match field.as_str() {
            "name" => match operator.as_str() {
                "contains" => Ok(Query::NameContains(operand.to_string())),
                _ => Err(invalid_operator("'contains'")),
            },
            "ext" | "extension" => match operator.as_str() {
                "is" => Ok(Query::ExtensionIs(normalize_extension(operand))),
                _ => Err(invalid_operator("'is'")),
            },
            "size" => {
                let direction = match operator.as_str() {
                    ">" => SizeComparison::GreaterThan,
                    "<" => SizeComparison::LessThan,
                    _ => return Err(invalid_operator("'>' or '<'")),
                };
                let bytes = operand
                    .parse::<i64>()
                    .map_err(|_| ProtocolError::InvalidSize(operand.to_string()))?;
                Ok(Query::Size { direction, bytes })
            }
            _ => Err(ProtocolError::UnknownField(field.clone())),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::NameContains(text) => write!(f, "Files containing '{}' in name", text),
            Query::ExtensionIs(ext) => write!(f, "Files with extension '{}'", ext),
            Query::Size { direction, bytes } => {
                let comparison = match direction {
                    SizeComparison::GreaterThan => "larger than",
                    SizeComparison::LessThan => "smaller than",
                };
                write!(f, "Files {} {} bytes", comparison, bytes)
            }
        }
    }
}

/// Lowercase and drop one leading dot (".PDF" -> "pdf")
pub fn normalize_extension(ext: &str) -> String {
    ext.strip_prefix('.').unwrap_or(ext).to_lowercase()
}

/// Split on whitespace into at most `max` tokens; the last keeps the rest
/// of the line verbatim
fn split_tokens(line: &str, max: usize) -> Vec<&str> {
    let mut tokens = Vec::with_capacity(max);
    let mut rest = line.trim();

    while !rest.is_empty() {
        if tokens.len() + 1 == max {
            tokens.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                tokens.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                tokens.push(rest);
                break;
            }
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_verbs() {
        assert_eq!(Command::parse("HELP"), Ok(Command::Help));
        assert_eq!(Command::parse("  stats  "), Ok(Command::Stats));
        assert_eq!(Command::parse("Quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_find_forms() {
        assert_eq!(
            Command::parse("FIND name contains report"),
            Ok(Command::Find(Query::NameContains("report".into())))
        );
        assert_eq!(
            Command::parse("find EXT IS .PDF"),
            Ok(Command::Find(Query::ExtensionIs("pdf".into())))
        );
        assert_eq!(
            Command::parse("FIND extension is jpg"),
            Ok(Command::Find(Query::ExtensionIs("jpg".into())))
        );
        assert_eq!(
            Command::parse("FIND size > 1048576"),
            Ok(Command::Find(Query::Size {
                direction: SizeComparison::GreaterThan,
                bytes: 1_048_576
            }))
        );
        assert_eq!(
            Command::parse("FIND size < -5"),
            Ok(Command::Find(Query::Size {
                direction: SizeComparison::LessThan,
                bytes: -5
            }))
        );
    }

    #[test]
    fn test_operand_keeps_inner_whitespace() {
        assert_eq!(
            Command::parse("FIND name   contains   annual  report "),
            Ok(Command::Find(Query::NameContains("annual  report".into())))
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Command::parse("DELETE everything"),
            Err(ProtocolError::UnknownCommand("DELETE everything".into()))
        );
        assert_eq!(
            Command::parse("HELP me"),
            Err(ProtocolError::UnknownCommand("HELP me".into()))
        );
        assert_eq!(Command::parse("FIND name contains"), Err(ProtocolError::FindSyntax));
        assert_eq!(Command::parse("FIND"), Err(ProtocolError::FindSyntax));
        assert_eq!(
            Command::parse("FIND owner is root"),
            Err(ProtocolError::UnknownField("owner".into()))
        );
        assert_eq!(
            Command::parse("FIND size = 10"),
            Err(ProtocolError::InvalidOperator {
                field: "size".into(),
                operator: "=".into(),
                expected: "'>' or '<'"
            })
        );
        assert!(matches!(
            Command::parse("FIND name is x"),
            Err(ProtocolError::InvalidOperator { .. })
        ));
        assert_eq!(
            Command::parse("FIND size > big"),
            Err(ProtocolError::InvalidSize("big".into()))
        );
        assert_eq!(
            Command::parse("FIND size > 10 20"),
            Err(ProtocolError::InvalidSize("10 20".into()))
        );
    }

    #[test]
    fn test_from_str() {
        let command: Command = "stats".parse().unwrap();
        assert_eq!(command, Command::Stats);
    }

    #[test]
    fn test_split_tokens() {
        assert_eq!(split_tokens("a b c d e", 4), vec!["a", "b", "c", "d e"]);
        assert_eq!(split_tokens("  a\tb  ", 4), vec!["a", "b"]);
        assert!(split_tokens("   ", 4).is_empty());
    }

    #[test]
    fn test_query_display() {
        let query = Query::ExtensionIs("pdf".into());
        assert_eq!(query.to_string(), "Files with extension 'pdf'");
    }
}
