//! Stage 3: scrape the terminal URL's HTML (no script execution).

use maplink_core::RegionFilter;
use reqwest::Client;

use crate::error::ResolveError;
use crate::rules::{
    first_match, CoordinateRule, RuleKind, RuleMatch, CENTER_KEY_RE, LOCATION_KEY_RE,
    NESTED_ARRAY_RE, PRECISE_BRACKET_RE,
};

/// HTML rules in priority order. Only the high-precision bracket rule is
/// region-checked; the keyed rules are specific enough on their own.
pub(crate) static HTML_RULES: [CoordinateRule; 6] = [
    CoordinateRule::pattern("precise_bracket", &PRECISE_BRACKET_RE).region_checked(),
    CoordinateRule::pattern("center_key", &CENTER_KEY_RE),
    CoordinateRule::pattern("location_key", &LOCATION_KEY_RE),
    CoordinateRule::pattern("nested_array", &NESTED_ARRAY_RE),
    CoordinateRule {
        name: "og_meta",
        kind: RuleKind::MetaPair {
            lat_key: "og:latitude",
            lon_key: "og:longitude",
        },
        region_checked: false,
    },
    CoordinateRule {
        name: "place_meta",
        kind: RuleKind::MetaPair {
            lat_key: "place:location:latitude",
            lon_key: "place:location:longitude",
        },
        region_checked: false,
    },
];

/// Fetch the HTML body of `url` with a browser-like identity.
///
/// # Errors
///
/// Returns [`ResolveError::Http`] on transport failure or a non-2xx status.
pub async fn fetch_page_html(
    client: &Client,
    url: &str,
    user_agent: &str,
) -> Result<String, ResolveError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        )
        .header(reqwest::header::ACCEPT_LANGUAGE, "es-ES,es;q=0.9,en;q=0.8")
        .send()
        .await?
        .error_for_status()?;

    Ok(response.text().await?)
}

/// Apply [`HTML_RULES`] to a page body.
#[must_use]
pub fn extract_from_html(html: &str, region: RegionFilter) -> Option<RuleMatch> {
    first_match(&HTML_RULES, html, region)
}

#[cfg(test)]
mod tests {
    use maplink_core::Coordinates;

    use super::*;

    #[test]
    fn prefers_precise_bracket_pair() {
        let html = r#"<script>var s = {"center":[-10.5,-60.5]}; init([-17.7833451,-63.1821349]);</script>"#;
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.rule, "precise_bracket");
        assert_eq!(m.coords, Coordinates { lat: -17.783_345_1, lon: -63.182_134_9 });
    }

    #[test]
    fn skips_bracket_pairs_outside_region() {
        let html = "[0.1234567,0.7654321] [-0.5123456,-63.1234567] [-17.7833451,-63.1821349]";
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.coords, Coordinates { lat: -17.783_345_1, lon: -63.182_134_9 });
    }

    #[test]
    fn bracket_pairs_need_six_fraction_digits() {
        let html = "[-17.78345,-63.18213]";
        assert!(extract_from_html(html, RegionFilter::SouthWest).is_none());
    }

    #[test]
    fn falls_back_to_center_key() {
        let html = r#"{"zoom":14,"center": [40.4168, -3.7038]}"#;
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.rule, "center_key");
        assert_eq!(m.coords, Coordinates { lat: 40.4168, lon: -3.7038 });
    }

    #[test]
    fn location_key_runs_after_center_key() {
        let html = r#"{"location":[-16.5,-68.15],"center":[-17.78,-63.18]}"#;
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.rule, "center_key");
    }

    #[test]
    fn falls_back_to_location_key() {
        let html = r#"{"location":[-16.5,-68.15]}"#;
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.rule, "location_key");
    }

    #[test]
    fn falls_back_to_nested_array() {
        let html = "window.INIT=[[-16.4897,-68.1193],[1,2]]";
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.rule, "nested_array");
        assert_eq!(m.coords, Coordinates { lat: -16.4897, lon: -68.1193 });
    }

    #[test]
    fn keyed_rule_rejects_out_of_range_and_continues() {
        let html = r#"{"center":[95.0,10.0]} <meta property="og:latitude" content="-17.78"><meta property="og:longitude" content="-63.18">"#;
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.rule, "og_meta");
    }

    #[test]
    fn falls_back_to_place_meta_tags() {
        let html = r#"<meta property="place:location:latitude" content="-19.0429">
            <meta property="place:location:longitude" content="-65.2592">"#;
        let m = extract_from_html(html, RegionFilter::SouthWest).expect("match");
        assert_eq!(m.rule, "place_meta");
        assert_eq!(m.coords, Coordinates { lat: -19.0429, lon: -65.2592 });
    }

    #[test]
    fn returns_none_for_plain_page() {
        assert!(extract_from_html("<html><body>Hello</body></html>", RegionFilter::SouthWest).is_none());
    }
}
