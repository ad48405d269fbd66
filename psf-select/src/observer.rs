//! Optional hooks into a selection run
//!
//! The selector reports what it sees to a [`SelectionObserver`] supplied by the
//! caller, for display or diagnostics. The algorithm never reads anything back.

use crate::clump::Clump;
use crate::image_proc::{CandidateError, PsfCandidate};
use crate::source::Source;

/// Why a source that matched a clump was not turned into a candidate
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// The candidate builder failed
    Candidate(CandidateError),
    /// The stamp's maximum pixel was NaN or infinite
    NonFinitePeak(f64),
}

/// Receives progress events from a selection run. All methods default to no-ops.
pub trait SelectionObserver {
    /// A source was considered for the moment histogram
    fn source_histogrammed(&self, _source: &Source, _good: bool) {}

    /// Clumps were found in the histogram
    fn clumps_found(&self, _clumps: &[Clump]) {}

    /// A source was accepted as a PSF star
    fn candidate_accepted(&self, _source: &Source, _candidate: &PsfCandidate) {}

    /// A good source matched a clump but produced no candidate
    fn candidate_rejected(&self, _source: &Source, _reason: &RejectionReason) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SelectionObserver for NullObserver {}
