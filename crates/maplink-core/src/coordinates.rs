//! Coordinate candidates and the validation gate every extraction stage
//! routes them through.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// An unparsed `(lat, lon)` pair as captured from a URL, HTML body, or
/// rendered page. Only [`validate_candidate`] turns it into [`Coordinates`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub lat_raw: String,
    pub lon_raw: String,
}

impl Candidate {
    #[must_use]
    pub fn new(lat_raw: impl Into<String>, lon_raw: impl Into<String>) -> Self {
        Self {
            lat_raw: lat_raw.into(),
            lon_raw: lon_raw.into(),
        }
    }
}

/// Parse both halves of a candidate and accept it iff
/// `-90 <= lat <= 90` and `-180 <= lon <= 180`.
///
/// Non-numeric or non-finite values are rejected.
#[must_use]
pub fn validate_candidate(candidate: &Candidate) -> Option<Coordinates> {
    let lat = candidate.lat_raw.trim().parse::<f64>().ok()?;
    let lon = candidate.lon_raw.trim().parse::<f64>().ok()?;

    if (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) {
        Some(Coordinates { lat, lon })
    } else {
        None
    }
}

/// Deployment-region heuristic applied to high-precision bracketed pairs
/// scraped from page bodies, where unrelated numeric arrays are common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionFilter {
    /// Both values negative with magnitude greater than one (southern and
    /// western hemispheres, away from the equator and prime meridian).
    #[default]
    SouthWest,
    /// Accept anything the validator accepts.
    Disabled,
}

impl RegionFilter {
    #[must_use]
    pub fn allows(self, coords: Coordinates) -> bool {
        match self {
            RegionFilter::SouthWest => coords.lat < -1.0 && coords.lon < -1.0,
            RegionFilter::Disabled => true,
        }
    }
}

impl FromStr for RegionFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "southwest" | "south-west" => Ok(RegionFilter::SouthWest),
            "none" | "off" | "disabled" => Ok(RegionFilter::Disabled),
            other => Err(format!(
                "unknown region filter '{other}' (expected 'southwest' or 'none')"
            )),
        }
    }
}
