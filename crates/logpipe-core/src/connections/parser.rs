//! Connection string parser
//!
//! A connection string lists one or more sinks with their options:
//!
//! ```text
//! file(filename="log.sil", async.enabled="true"), tcp(host="localhost")
//! ```
//!
//! The parser only splits the string into protocol names and raw option
//! text; the option text is interpreted later by
//! [`OptionsParser`](super::options::OptionsParser).

use crate::errors::ParseError;

/// One `name(options)` entry of a connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEntry {
    /// Protocol name, lowercased and trimmed
    pub protocol: String,
    /// Raw option text between the parentheses, trimmed, quotes preserved
    pub options: String,
}

/// Splits connection strings into [`ConnectionEntry`] values
pub struct ConnectionsParser;

impl ConnectionsParser {
    /// Parse a complete connection string
    ///
    /// An empty (or all-whitespace) string yields no entries. Error positions
    /// are 1-based character offsets into the trimmed string; errors caused by
    /// running out of input point at the final character.
    pub fn parse(connections: &str) -> Result<Vec<ConnectionEntry>, ParseError> {
        let chars: Vec<char> = connections.trim().chars().collect();
        let len = chars.len();
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < len {
            let mut name = String::new();
            while pos < len && chars[pos] != '(' {
                name.push(chars[pos]);
                pos += 1;
            }

            if pos >= len {
                return Err(ParseError::MissingOpenParen { position: len });
            }
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                return Err(ParseError::EmptyProtocolName { position: pos + 1 });
            }
            pos += 1;

            let mut options = String::new();
            let mut quoted = false;
            let mut quote_position = 0;
            let mut closed = false;

            while pos < len {
                let symbol = chars[pos];
                pos += 1;
                match symbol {
                    '"' if pos < len && chars[pos] == '"' => {
                        // Escaped quote, kept verbatim for the options parser.
                        options.push_str("\"\"");
                        pos += 1;
                    }
                    '"' => {
                        quoted = !quoted;
                        if quoted {
                            quote_position = pos;
                        }
                        options.push(symbol);
                    }
                    ')' if !quoted => {
                        closed = true;
                        break;
                    }
                    _ => options.push(symbol),
                }
            }

            if quoted {
                return Err(ParseError::UnterminatedQuote {
                    protocol: name,
                    position: quote_position,
                });
            }
            if !closed {
                return Err(ParseError::MissingCloseParen { position: len });
            }
            if pos < len && chars[pos] == ',' {
                pos += 1;
            }

            entries.push(ConnectionEntry {
                protocol: name,
                options: options.trim().to_string(),
            });
        }

        Ok(entries)
    }
}
