//! Stage 2: coordinates embedded in the terminal URL itself.

use maplink_core::RegionFilter;

use crate::rules::{
    first_match, CoordinateRule, RuleKind, RuleMatch, AT_SEGMENT_RE, DATA_MARKER_RE,
    QUERY_PAIR_RE,
};

/// URL rules in priority order. Also reused by the render stage against the
/// browser's post-navigation URL.
pub(crate) static URL_RULES: [CoordinateRule; 4] = [
    CoordinateRule::pattern("at_segment", &AT_SEGMENT_RE),
    CoordinateRule::pattern("data_markers", &DATA_MARKER_RE),
    CoordinateRule::pattern("query_pair", &QUERY_PAIR_RE),
    CoordinateRule {
        name: "query_param",
        kind: RuleKind::QueryParam("q"),
        region_checked: false,
    },
];

/// Match a (percent-decoded) URL against [`URL_RULES`].
#[must_use]
pub fn extract_from_url(url: &str) -> Option<RuleMatch> {
    // URL rules never apply the region filter.
    first_match(&URL_RULES, url, RegionFilter::Disabled)
}

#[cfg(test)]
mod tests {
    use maplink_core::Coordinates;

    use super::*;

    fn coords(url: &str) -> Option<(f64, f64)> {
        extract_from_url(url).map(|m| (m.coords.lat, m.coords.lon))
    }

    #[test]
    fn extracts_at_segment_with_zoom() {
        assert_eq!(
            coords("https://www.google.com/maps/place/Cristo/@-17.783,-63.182,15z/data=x"),
            Some((-17.783, -63.182))
        );
    }

    #[test]
    fn extracts_at_segment_across_value_range() {
        for (lat, lon) in [(0.0, 0.0), (89.999, 179.999), (-90.0, -180.0), (45.5, -122.25)] {
            let url = format!("https://maps.example.com/@{lat:.3},{lon:.3},12z");
            let m = extract_from_url(&url).expect("at-segment match");
            assert_eq!(m.rule, "at_segment");
            assert!((m.coords.lat - lat).abs() < 1e-9, "lat for {url}");
            assert!((m.coords.lon - lon).abs() < 1e-9, "lon for {url}");
        }
    }

    #[test]
    fn extracts_data_markers_with_noise_between() {
        let m = extract_from_url(
            "https://www.google.com/maps/place/X/data=!4m6!3m5!1s0x93f1e8!8m2!3d12.345!4d-65.432!16s",
        )
        .expect("data marker match");
        assert_eq!(m.rule, "data_markers");
        assert_eq!(m.coords, Coordinates { lat: 12.345, lon: -65.432 });
    }

    #[test]
    fn out_of_range_at_segment_falls_through_to_data_markers() {
        let m = extract_from_url("https://maps.example.com/@95.000,10.000,5z/data=!3d12.345!4d-65.432")
            .expect("fallback match");
        assert_eq!(m.rule, "data_markers");
        assert_eq!(m.coords, Coordinates { lat: 12.345, lon: -65.432 });
    }

    #[test]
    fn extracts_query_pair_directly() {
        let m = extract_from_url("https://maps.google.com/maps?q=-17.7833,-63.1821&z=15").expect("q match");
        assert_eq!(m.rule, "query_pair");
        assert_eq!(m.coords, Coordinates { lat: -17.7833, lon: -63.1821 });
    }

    #[test]
    fn falls_back_to_structured_query_param() {
        let m = extract_from_url("https://maps.google.com/maps?z=15&q=-17.7833,+-63.1821").expect("q match");
        assert_eq!(m.rule, "query_param");
        assert_eq!(m.coords, Coordinates { lat: -17.7833, lon: -63.1821 });
    }

    #[test]
    fn returns_none_without_coordinates() {
        assert_eq!(coords("https://maps.app.goo.gl/AbCdEf123"), None);
        assert_eq!(coords("https://www.google.com/maps/place/Somewhere"), None);
    }

    #[test]
    fn same_url_yields_same_coordinates() {
        let url = "https://maps.example.com/@-17.783,-63.182,15z";
        assert_eq!(extract_from_url(url), extract_from_url(url));
    }
}
