//! Connection string handling
//!
//! Splitting a connection string into entries, and parsing the option text
//! of each entry into an [`OptionTable`].

pub mod options;
pub mod parser;

pub use options::{parse_size, parse_timespan, OptionTable, OptionsParser};
pub use parser::{ConnectionEntry, ConnectionsParser};

impl ConnectionEntry {
    /// Parse this entry's option text
    pub fn option_table(&self) -> Result<OptionTable, crate::errors::ParseError> {
        OptionsParser::parse(&self.protocol, &self.options)
    }
}
