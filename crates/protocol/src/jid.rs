use std::fmt;

use thiserror::Error;

/// Server appended to bare phone-number destinations.
const USER_SERVER: &str = "s.whatsapp.net";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JidError {
    #[error("destination is empty")]
    Empty,
    #[error("destination contains no digits")]
    NoDigits,
}

/// A fully-qualified protocol address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid(String);

impl Jid {
    /// Normalize a caller-supplied destination.
    ///
    /// Anything already containing `@` passes through untouched; the
    /// rest is treated as a raw phone number, non-digits stripped and
    /// the user server appended.
    pub fn normalize(input: &str) -> Result<Self, JidError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(JidError::Empty);
        }
        if trimmed.contains('@') {
            return Ok(Self(trimmed.to_string()));
        }
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(JidError::NoDigits);
        }
        Ok(Self(format!("{digits}@{USER_SERVER}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_address_passes_through() {
        let jid = Jid::normalize("15551234@s.custom").unwrap();
        assert_eq!(jid.as_str(), "15551234@s.custom");
    }

    #[test]
    fn test_bare_number_is_qualified() {
        let jid = Jid::normalize("+1 (555) 123-4567").unwrap();
        assert_eq!(jid.as_str(), "15551234567@s.whatsapp.net");
    }

    #[test]
    fn test_empty_and_digitless_rejected() {
        assert_eq!(Jid::normalize("   "), Err(JidError::Empty));
        assert_eq!(Jid::normalize("abc"), Err(JidError::NoDigits));
    }
}
