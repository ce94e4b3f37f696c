use serde::{Deserialize, Serialize};

use crate::coordinates::Coordinates;

/// Final success payload: the URL the link resolved to plus the coordinates
/// found for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub resolved_url: String,
    pub lat: f64,
    pub lon: f64,
}

impl ResolvedLocation {
    #[must_use]
    pub fn new(resolved_url: impl Into<String>, coords: Coordinates) -> Self {
        Self {
            resolved_url: resolved_url.into(),
            lat: coords.lat,
            lon: coords.lon,
        }
    }

    #[must_use]
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }
}
