// Table Error Handling

use std::fmt;

/// A `[start, end)` byte span inside one bank.
pub type Span = (usize, usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    // Load errors
    MalformedTable {
        table: String,
        index: Option<usize>,
        detail: String,
    },
    UnterminatedRecord {
        bank: usize,
        start: usize,
    },

    // Store errors
    InvalidRecord {
        table: String,
        index: Option<usize>,
        detail: String,
    },
    OutOfSpace {
        table: String,
        index: usize,
        bank: usize,
        required: usize,
        available: Vec<Span>,
    },
    Overlap {
        bank: usize,
        write: Span,
        entry: usize,
        other: Span,
        other_entry: usize,
    },

    // Configuration errors
    Layout(String),

    // IO errors
    Io(String),
}

pub type Result<T> = std::result::Result<T, TableError>;

impl TableError {
    pub fn malformed(table: &str, index: Option<usize>, detail: impl Into<String>) -> Self {
        TableError::MalformedTable {
            table: table.to_string(),
            index,
            detail: detail.into(),
        }
    }

    /// invalid_record is raised by codecs; the engine names the entry with `for_entry`
    pub fn invalid_record(detail: impl Into<String>) -> Self {
        TableError::InvalidRecord {
            table: String::new(),
            index: None,
            detail: detail.into(),
        }
    }

    pub fn for_entry(self, table: &str, index: usize) -> Self {
        match self {
            TableError::InvalidRecord { detail, .. } => TableError::InvalidRecord {
                table: table.to_string(),
                index: Some(index),
                detail,
            },
            other => other,
        }
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TableError::MalformedTable {
                table,
                index: Some(index),
                detail,
            } => {
                write!(f, "Malformed table '{}' at entry {:#x}: {}", table, index, detail)
            }
            TableError::MalformedTable {
                table,
                index: None,
                detail,
            } => {
                write!(f, "Malformed table '{}': {}", table, detail)
            }
            TableError::UnterminatedRecord { bank, start } => {
                write!(
                    f,
                    "Unterminated record starting at {:#04x}:{:#06x} runs off the end of the bank",
                    bank, start
                )
            }
            TableError::InvalidRecord {
                table,
                index: Some(index),
                detail,
            } => {
                write!(f, "Entry {:#x} of '{}' cannot be stored: {}", index, table, detail)
            }
            TableError::InvalidRecord { detail, .. } => {
                write!(f, "Record cannot be stored: {}", detail)
            }
            TableError::OutOfSpace {
                table,
                index,
                bank,
                required,
                available,
            } => {
                write!(
                    f,
                    "Out of space in bank {:#04x} for '{}' entry {:#x}: need {} bytes, free spans [",
                    bank, table, index, required
                )?;
                for (n, (start, end)) in available.iter().enumerate() {
                    if n > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:#06x}..{:#06x} ({})", start, end, end - start)?;
                }
                write!(f, "]")
            }
            TableError::Overlap {
                bank,
                write,
                entry,
                other,
                other_entry,
            } => {
                write!(
                    f,
                    "Write of entry {:#x} to {:#04x}:{:#06x}..{:#06x} overlaps entry {:#x} at {:#06x}..{:#06x}",
                    entry, bank, write.0, write.1, other_entry, other.0, other.1
                )
            }
            TableError::Layout(msg) => {
                write!(f, "Layout error: {}", msg)
            }
            TableError::Io(msg) => {
                write!(f, "IO error: {}", msg)
            }
        }
    }
}

impl std::error::Error for TableError {}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        TableError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for TableError {
    fn from(e: toml::de::Error) -> Self {
        TableError::Layout(e.to_string())
    }
}

impl From<toml::ser::Error> for TableError {
    fn from(e: toml::ser::Error) -> Self {
        TableError::Layout(e.to_string())
    }
}
