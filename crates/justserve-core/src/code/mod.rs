//! Transfer code generation and validation.
//!
//! A transfer code is the short string a sender reads out to a receiver so
//! the receiver can pick the right session out of the discovery broadcasts.
//!
//! ## Code Format
//!
//! Exactly six decimal digits, never starting with `0` when generated
//! (`100000..=999999`). Codes are not secrets: anyone on the LAN sees them
//! in the broadcast frames.
//!
//! ## Example
//!
//! ```
//! use justserve_core::code::TransferCode;
//!
//! let code = TransferCode::generate();
//! assert_eq!(code.as_str().len(), 6);
//!
//! let parsed = TransferCode::parse(" 123456 ").unwrap();
//! assert_eq!(parsed.as_str(), "123456");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of a transfer code
pub const CODE_LENGTH: usize = 6;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// A validated transfer code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferCode {
    code: String,
}

impl TransferCode {
    /// Parse and validate a transfer code.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly six ASCII digits.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if trimmed.len() != CODE_LENGTH {
            return Err(Error::InvalidCodeFormat(format!(
                "code must be {} digits, got {}",
                CODE_LENGTH,
                trimmed.len()
            )));
        }

        if let Some(c) = trimmed.chars().find(|c| !c.is_ascii_digit()) {
            return Err(Error::InvalidCodeFormat(format!(
                "invalid character '{c}' in code"
            )));
        }

        Ok(Self {
            code: trimmed.to_string(),
        })
    }

    /// Draw a fresh random code.
    pub fn generate() -> Self {
        use rand::Rng;

        let value = rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX);
        Self {
            code: value.to_string(),
        }
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

impl std::fmt::Display for TransferCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

impl TryFrom<String> for TransferCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<TransferCode> for String {
    fn from(code: TransferCode) -> Self {
        code.code
    }
}
