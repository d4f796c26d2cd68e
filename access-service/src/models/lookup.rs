use std::fmt;

use crate::utils::validation::is_valid_name;

/// A path-segment reference to a record: numeric segments address by id,
/// anything else by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(i64),
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    ZeroId,
    InvalidName(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::ZeroId => write!(f, "id must be positive"),
            LookupError::InvalidName(name) => write!(f, "invalid name: {name}"),
        }
    }
}

impl Lookup {
    pub fn parse(segment: &str) -> Result<Self, LookupError> {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            return match segment.parse::<i64>() {
                Ok(0) => Err(LookupError::ZeroId),
                Ok(id) => Ok(Lookup::Id(id)),
                Err(_) => Err(LookupError::InvalidName(segment.to_string())),
            };
        }

        if is_valid_name(segment) {
            Ok(Lookup::Name(segment.to_string()))
        } else {
            Err(LookupError::InvalidName(segment.to_string()))
        }
    }

    pub fn matches(&self, id: i64, name: &str) -> bool {
        match self {
            Lookup::Id(wanted) => *wanted == id,
            Lookup::Name(wanted) => wanted == name,
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Id(id) => write!(f, "{id}"),
            Lookup::Name(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_segment_is_id() {
        assert_eq!(Lookup::parse("42"), Ok(Lookup::Id(42)));
    }

    #[test]
    fn test_zero_id_rejected() {
        assert_eq!(Lookup::parse("0"), Err(LookupError::ZeroId));
    }

    #[test]
    fn test_name_segment() {
        assert_eq!(Lookup::parse("acme"), Ok(Lookup::Name("acme".into())));
        assert_eq!(
            Lookup::parse("vpn-1.eu"),
            Ok(Lookup::Name("vpn-1.eu".into()))
        );
    }

    #[test]
    fn test_bad_names_rejected() {
        assert!(Lookup::parse("").is_err());
        assert!(Lookup::parse("1abc").is_err());
        assert!(Lookup::parse("abc-").is_err());
        assert!(Lookup::parse("a\"b").is_err());
    }

    #[test]
    fn test_overflowing_id_rejected() {
        assert!(Lookup::parse("99999999999999999999").is_err());
    }
}
