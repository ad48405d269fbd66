//! Assignment of sources to histogram clumps
//!
//! Each source's corrected moments are placed in histogram coordinates and tested
//! against the clumps in order. A good source inside a clump's acceptance ellipse
//! becomes a PSF candidate and is flagged as a star.
//!
//! For a round clump (`Ixx == Iyy`, `Ixy == 0`) the acceptance region is the
//! circle `dx² + dy² < 2·n_sigma·Ixx`.

use log::{debug, trace};
use ndarray::ArrayView2;

use crate::clump::Clump;
use crate::config::SelectorConfig;
use crate::distortion::MomentCorrector;
use crate::image_proc::{CandidateBuilder, PsfCandidate};
use crate::observer::{NullObserver, RejectionReason, SelectionObserver};
use crate::source::{Source, SourceFlags};

static NULL_OBSERVER: NullObserver = NullObserver;

/// Quality filter and nearest-clump classifier
pub struct SourceClassifier<'a> {
    config: &'a SelectorConfig,
    corrector: &'a dyn MomentCorrector,
    builder: &'a dyn CandidateBuilder,
    observer: &'a dyn SelectionObserver,
}

impl<'a> SourceClassifier<'a> {
    /// `corrector` must be the one used to build the histogram the clumps came from.
    pub fn new(
        config: &'a SelectorConfig,
        corrector: &'a dyn MomentCorrector,
        builder: &'a dyn CandidateBuilder,
    ) -> Self {
        Self {
            config,
            corrector,
            builder,
            observer: &NULL_OBSERVER,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn SelectionObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Should this source be used for PSF selection?
    ///
    /// Rejects sources carrying any bad-source flag, fainter than `flux_lim`
    /// (when set) or brighter than `flux_max` (when non-zero).
    pub fn is_good_source(&self, source: &Source) -> bool {
        is_good_source(self.config, source)
    }

    /// Histogram pixel coordinates of a source's corrected moments
    pub fn histogram_position(&self, source: &Source) -> (f64, f64) {
        let m = self
            .corrector
            .correct(source.x, source.y, source.moments);
        self.config.histogram.moments_to_pixel(m.ixx, m.iyy)
    }

    /// Select PSF stars from `sources`.
    ///
    /// A source is accepted by the first clump, in list order, with
    /// `dist² < 2·n_sigma` provided it is a good source. Accepted sources get the
    /// [`SourceFlags::STAR`] flag and a candidate stamp of `candidate_size()`
    /// pixels cut from `image`. Sources whose stamp cannot be built or has a
    /// non-finite maximum are skipped.
    pub fn select_stars(
        &self,
        image: ArrayView2<f64>,
        sources: &mut [Source],
        clumps: &[Clump],
        n_sigma: f64,
    ) -> Vec<PsfCandidate> {
        let size = self.config.candidate_size();
        let limit = 2.0 * n_sigma;
        let mut candidates = Vec::new();

        for source in sources.iter_mut() {
            let good = self.is_good_source(source);
            let (x, y) = self.histogram_position(source);

            for clump in clumps {
                // Written as `<` so that NaN distances reject
                let inside = clump.distance_squared(x, y) < limit;
                if !inside || !good {
                    continue;
                }

                match self
                    .builder
                    .build(source, image, size, size, self.config.border_width)
                {
                    Ok(candidate) => {
                        let peak = candidate.peak();
                        if peak.is_finite() {
                            source.set_star();
                            self.observer.candidate_accepted(source, &candidate);
                            candidates.push(candidate);
                        } else {
                            trace!("Source {} stamp has peak {peak}", source.id);
                            self.observer
                                .candidate_rejected(source, &RejectionReason::NonFinitePeak(peak));
                        }
                    }
                    Err(e) => {
                        debug!("No PSF candidate for source {}: {e}", source.id);
                        self.observer
                            .candidate_rejected(source, &RejectionReason::Candidate(e));
                    }
                }
                break;
            }
        }

        candidates
    }
}

/// Quality and flux cuts shared by the histogram and classification passes
pub fn is_good_source(config: &SelectorConfig, source: &Source) -> bool {
    if source.flags.intersects(SourceFlags::BAD_SOURCE_MASK) {
        return false;
    }
    if let Some(lim) = config.flux_lim {
        // Ignore faint objects
        if source.psf_flux < lim {
            return false;
        }
    }
    // Ignore bright objects
    if config.flux_max != 0.0 && source.psf_flux > config.flux_max {
        return false;
    }
    true
}
