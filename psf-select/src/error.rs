use thiserror::Error;

use crate::image_proc::MeasurementError;

/// Terminal failures of a selection run.
///
/// Everything else (unmeasurable regions, candidates that cannot be built,
/// degenerate clump shapes) is recovered locally and only shrinks the result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    #[error("No candidate PSF sources")]
    NoCandidates,
    #[error("Failed to determine center of PSF clump{}", last_error_suffix(.last_error))]
    ClumpDetectionFailed {
        /// Last region measurement failure, if any region was attempted
        last_error: Option<MeasurementError>,
    },
}

fn last_error_suffix(last_error: &Option<MeasurementError>) -> String {
    match last_error {
        Some(e) => format!(": {e}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            SelectionError::NoCandidates.to_string(),
            "No candidate PSF sources"
        );
        let bare = SelectionError::ClumpDetectionFailed { last_error: None };
        assert_eq!(bare.to_string(), "Failed to determine center of PSF clump");
        let with_cause = SelectionError::ClumpDetectionFailed {
            last_error: Some(MeasurementError::NoWeight(0.0)),
        };
        assert_eq!(
            with_cause.to_string(),
            "Failed to determine center of PSF clump: Footprint has no positive weight (total 0)"
        );
    }
}
