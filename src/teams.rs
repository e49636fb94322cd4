// 🏰 House Registry - The four competing houses
//
// The house set is closed: houses are static configuration, never created
// or deleted at runtime. Display names and colors live here too so the
// rest of the crate never hard-codes a house string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// HOUSE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum House {
    Gryffindor,
    Slytherin,
    Hufflepuff,
    Ravenclaw,
}

impl House {
    /// All houses in canonical declaration order.
    ///
    /// This order is also the deterministic tie-break for the leaderboard:
    /// two houses on equal points rank in this order.
    pub const ALL: [House; 4] = [
        House::Gryffindor,
        House::Slytherin,
        House::Hufflepuff,
        House::Ravenclaw,
    ];

    /// Stable lowercase identifier (storage key, API value).
    pub fn as_str(&self) -> &'static str {
        match self {
            House::Gryffindor => "gryffindor",
            House::Slytherin => "slytherin",
            House::Hufflepuff => "hufflepuff",
            House::Ravenclaw => "ravenclaw",
        }
    }

    /// Human-facing name.
    pub fn display_name(&self) -> &'static str {
        match self {
            House::Gryffindor => "Gryffindor",
            House::Slytherin => "Slytherin",
            House::Hufflepuff => "Hufflepuff",
            House::Ravenclaw => "Ravenclaw",
        }
    }

    /// Banner color (hex) used by display surfaces.
    pub fn color(&self) -> &'static str {
        match self {
            House::Gryffindor => "#740001",
            House::Slytherin => "#1e4d13",
            House::Hufflepuff => "#ecb939",
            House::Ravenclaw => "#6d1bd9",
        }
    }
}

impl fmt::Display for House {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Input named a house outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHouse(pub String);

impl fmt::Display for UnknownHouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown house '{}' (expected one of: gryffindor, slytherin, hufflepuff, ravenclaw)",
            self.0
        )
    }
}

impl std::error::Error for UnknownHouse {}

impl FromStr for House {
    type Err = UnknownHouse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gryffindor" => Ok(House::Gryffindor),
            "slytherin" => Ok(House::Slytherin),
            "hufflepuff" => Ok(House::Hufflepuff),
            "ravenclaw" => Ok(House::Ravenclaw),
            _ => Err(UnknownHouse(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_identifiers() {
        for house in House::ALL {
            let parsed: House = house.as_str().parse().unwrap();
            assert_eq!(parsed, house);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Gryffindor".parse::<House>().unwrap(), House::Gryffindor);
        assert_eq!(" RAVENCLAW ".parse::<House>().unwrap(), House::Ravenclaw);
    }

    #[test]
    fn test_unknown_house_rejected() {
        let err = "durmstrang".parse::<House>().unwrap_err();
        assert_eq!(err.0, "durmstrang");
    }

    #[test]
    fn test_serde_uses_lowercase() {
        let json = serde_json::to_string(&House::Hufflepuff).unwrap();
        assert_eq!(json, "\"hufflepuff\"");
    }
}
