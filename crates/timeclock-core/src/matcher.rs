//! Gallery matching: probe encoding vs. enrolled identities.

use crate::encoding::FaceEncoding;

/// One enrolled identity as loaded from the store: the encoding stays in its
/// at-rest base64 form until compared, so one corrupt row cannot poison the
/// whole gallery load.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity_id: i64,
    pub name: String,
    pub encoding: String,
}

/// Result of matching a probe encoding against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance of the best qualifying match; `f64::INFINITY`
    /// when nothing qualified.
    pub distance: f64,
    pub identity_id: Option<i64>,
    pub identity_name: Option<String>,
}

impl MatchResult {
    fn no_match() -> Self {
        Self {
            matched: false,
            distance: f64::INFINITY,
            identity_id: None,
            identity_name: None,
        }
    }
}

/// Strategy for comparing a probe encoding against a gallery.
pub trait Matcher {
    fn compare(&self, probe: &FaceEncoding, gallery: &[GalleryEntry], threshold: f64)
        -> MatchResult;
}

/// Euclidean-distance matcher.
///
/// A gallery entry qualifies only when its distance is strictly below the
/// threshold AND strictly below the best distance seen so far, so exact ties
/// resolve to the first-encountered entry. Entries whose stored encoding
/// fails to decode are skipped with a warning; one corrupt enrollment must
/// not block recognition of the others.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &FaceEncoding,
        gallery: &[GalleryEntry],
        threshold: f64,
    ) -> MatchResult {
        let mut best = MatchResult::no_match();

        for entry in gallery {
            let stored = match FaceEncoding::from_base64(&entry.encoding) {
                Ok(enc) => enc,
                Err(err) => {
                    tracing::warn!(
                        identity_id = entry.identity_id,
                        name = %entry.name,
                        error = %err,
                        "skipping identity with malformed stored encoding"
                    );
                    continue;
                }
            };

            let distance = probe.euclidean_distance(&stored);
            if distance < threshold && distance < best.distance {
                best = MatchResult {
                    matched: true,
                    distance,
                    identity_id: Some(entry.identity_id),
                    identity_name: Some(entry.name.clone()),
                };
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ENCODING_DIM;

    fn encoding_with(first: f64) -> FaceEncoding {
        let mut values = vec![0.0; ENCODING_DIM];
        values[0] = first;
        FaceEncoding::from_values(values).unwrap()
    }

    fn entry(id: i64, name: &str, first: f64) -> GalleryEntry {
        GalleryEntry {
            identity_id: id,
            name: name.to_string(),
            encoding: encoding_with(first).to_base64(),
        }
    }

    #[test]
    fn picks_globally_minimal_distance() {
        let probe = encoding_with(0.0);
        let gallery = vec![entry(1, "far", 0.4), entry(2, "near", 0.1), entry(3, "mid", 0.3)];

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.identity_id, Some(2));
        assert!((result.distance - 0.1).abs() < 1e-12);
    }

    #[test]
    fn threshold_is_strict() {
        let probe = encoding_with(0.0);
        let gallery = vec![entry(1, "edge", 0.5)];

        // Distance exactly 0.5 does not qualify.
        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert!(!result.matched);
        assert_eq!(result.identity_id, None);
        assert_eq!(result.distance, f64::INFINITY);
    }

    #[test]
    fn exact_tie_goes_to_first_entry() {
        let probe = encoding_with(0.0);
        let gallery = vec![entry(7, "first", 0.2), entry(8, "second", 0.2)];

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert_eq!(result.identity_id, Some(7));
    }

    #[test]
    fn corrupt_entry_is_skipped_not_fatal() {
        let probe = encoding_with(0.0);
        let gallery = vec![
            GalleryEntry {
                identity_id: 1,
                name: "corrupt".to_string(),
                encoding: "AAAA".to_string(),
            },
            entry(2, "good", 0.1),
        ];

        let result = EuclideanMatcher.compare(&probe, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.identity_id, Some(2));
    }

    #[test]
    fn empty_gallery_never_matches() {
        let probe = encoding_with(0.0);
        let result = EuclideanMatcher.compare(&probe, &[], 0.5);
        assert!(!result.matched);
    }
}
