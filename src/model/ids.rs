//! Control identifiers and grid locations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of the surface (physical or virtual device) that originated an event
pub type SurfaceId = String;

/// Prefix used for grid-addressed controls
const LOCATION_PREFIX: &str = "loc:";
/// Prefix used for legacy page+bank addressed controls
const LEGACY_BANK_PREFIX: &str = "bank:";
/// Prefix used for triggers
const TRIGGER_PREFIX: &str = "trigger:";

/// Position of a button on the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlLocation {
    pub page: u32,
    pub row: u32,
    pub column: u32,
}

impl ControlLocation {
    pub fn new(page: u32, row: u32, column: u32) -> Self {
        Self { page, row, column }
    }
}

impl fmt::Display for ControlLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.page, self.row, self.column)
    }
}

impl FromStr for ControlLocation {
    type Err = ();

    /// Parses `page/row/column`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/').map(|p| p.trim().parse::<u32>());
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(page)), Some(Ok(row)), Some(Ok(column)), None) => {
                Ok(ControlLocation::new(page, row, column))
            }
            _ => Err(()),
        }
    }
}

/// Opaque, registry-unique control identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlId(String);

/// Structured view of a [`ControlId`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedControlId {
    Location(ControlLocation),
    LegacyBank { page: u32, bank: u32 },
    Trigger(String),
}

impl ControlId {
    /// Wrap a raw id without validating it
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn for_location(location: ControlLocation) -> Self {
        Self(format!("{}{}", LOCATION_PREFIX, location))
    }

    pub fn for_legacy_bank(page: u32, bank: u32) -> Self {
        Self(format!("{}{}-{}", LEGACY_BANK_PREFIX, page, bank))
    }

    pub fn for_trigger(id: &str) -> Self {
        Self(format!("{}{}", TRIGGER_PREFIX, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(&self) -> Option<ParsedControlId> {
        if let Some(rest) = self.0.strip_prefix(LOCATION_PREFIX) {
            return rest.parse().ok().map(ParsedControlId::Location);
        }
        if let Some(rest) = self.0.strip_prefix(LEGACY_BANK_PREFIX) {
            let (page, bank) = rest.split_once('-')?;
            return Some(ParsedControlId::LegacyBank {
                page: page.parse().ok()?,
                bank: bank.parse().ok()?,
            });
        }
        if let Some(rest) = self.0.strip_prefix(TRIGGER_PREFIX) {
            if rest.is_empty() {
                return None;
            }
            return Some(ParsedControlId::Trigger(rest.to_string()));
        }
        None
    }

    /// Grid location, when the id encodes one directly
    pub fn location(&self) -> Option<ControlLocation> {
        match self.parse()? {
            ParsedControlId::Location(location) => Some(location),
            _ => None,
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self.parse(), Some(ParsedControlId::Trigger(_)))
    }

    /// Whether a raw surface/originator id names a trigger
    pub fn str_is_trigger(raw: &str) -> bool {
        raw.strip_prefix(TRIGGER_PREFIX)
            .map(|rest| !rest.is_empty())
            .unwrap_or(false)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ControlId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_id_round_trip() {
        let loc = ControlLocation::new(3, 1, 7);
        let id = ControlId::for_location(loc);
        assert_eq!(id.as_str(), "loc:3/1/7");
        assert_eq!(id.location(), Some(loc));
        assert!(!id.is_trigger());
    }

    #[test]
    fn test_legacy_and_trigger_ids() {
        let bank = ControlId::for_legacy_bank(2, 12);
        assert_eq!(
            bank.parse(),
            Some(ParsedControlId::LegacyBank { page: 2, bank: 12 })
        );

        let trigger = ControlId::for_trigger("morning");
        assert!(trigger.is_trigger());
        assert!(ControlId::str_is_trigger("trigger:morning"));
        assert!(!ControlId::str_is_trigger("trigger:"));
        assert!(!ControlId::str_is_trigger("streamdeck:AL12"));
    }

    #[test]
    fn test_malformed_ids() {
        assert_eq!(ControlId::new("loc:1/2").parse(), None);
        assert_eq!(ControlId::new("loc:a/b/c").parse(), None);
        assert_eq!(ControlId::new("bank:1").parse(), None);
        assert_eq!(ControlId::new("something").parse(), None);
    }
}
