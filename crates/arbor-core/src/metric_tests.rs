//! Tests for `metric` module

use super::metric::*;

#[test]
fn test_element_kind_per_metric() {
    assert_eq!(MetricKind::Angular.element_kind(), ElementKind::F32);
    assert_eq!(MetricKind::Euclidean.element_kind(), ElementKind::F32);
    assert_eq!(MetricKind::Manhattan.element_kind(), ElementKind::F32);
    assert_eq!(MetricKind::Hamming.element_kind(), ElementKind::PackedU64);
}

#[test]
fn test_internal_dimension_float_metrics_is_identity() {
    for metric in [
        MetricKind::Angular,
        MetricKind::Euclidean,
        MetricKind::Manhattan,
    ] {
        assert_eq!(metric.internal_dimension(1), 1);
        assert_eq!(metric.internal_dimension(300), 300);
    }
}

#[test]
fn test_internal_dimension_hamming_rounds_up() {
    assert_eq!(MetricKind::Hamming.internal_dimension(1), 1);
    assert_eq!(MetricKind::Hamming.internal_dimension(64), 1);
    assert_eq!(MetricKind::Hamming.internal_dimension(65), 2);
    assert_eq!(MetricKind::Hamming.internal_dimension(128), 2);
    assert_eq!(MetricKind::Hamming.internal_dimension(129), 3);
}

#[test]
fn test_display_and_parse_round_trip() {
    for metric in MetricKind::ALL {
        let parsed: MetricKind = metric.to_string().parse().unwrap();
        assert_eq!(parsed, metric);
    }
}

#[test]
fn test_parse_aliases_and_case() {
    assert_eq!("Cosine".parse::<MetricKind>().unwrap(), MetricKind::Angular);
    assert_eq!("L2".parse::<MetricKind>().unwrap(), MetricKind::Euclidean);
    assert_eq!(" l1 ".parse::<MetricKind>().unwrap(), MetricKind::Manhattan);
    assert_eq!("HAMMING".parse::<MetricKind>().unwrap(), MetricKind::Hamming);
    assert!("jaccard".parse::<MetricKind>().is_err());
}

#[test]
fn test_metric_serialization() {
    let json = serde_json::to_string(&MetricKind::Hamming).unwrap();
    let back: MetricKind = serde_json::from_str(&json).unwrap();
    assert_eq!(back, MetricKind::Hamming);
}
