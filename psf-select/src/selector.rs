//! End-to-end second-moment star selection
//!
//! This is a naive algorithm and should be used with caution: it assumes the
//! stars of an exposure outnumber any other population of compact sources with a
//! common shape.
//!
//! # Usage
//!
//! ```rust
//! use ndarray::Array2;
//! use psf_select::{Moments, SecondMomentStarSelector, SelectorConfig, Source};
//!
//! let image = Array2::<f64>::from_elem((200, 200), 10.0);
//! let mut sources: Vec<Source> = (0..20)
//!     .map(|i| {
//!         let jitter = 0.01 * i as f64;
//!         let pos = 30.0 + 7.0 * i as f64;
//!         Source::new(i, pos, pos, Moments::new(4.0 + jitter, 0.0, 4.0 - jitter), 1e4)
//!     })
//!     .collect();
//!
//! let selector = SecondMomentStarSelector::new(SelectorConfig::default());
//! let candidates = selector.select_stars(image.view(), &mut sources).unwrap();
//! assert_eq!(candidates.len(), 20);
//! assert!(sources.iter().all(|s| s.is_star()));
//! ```

use log::{debug, info};
use ndarray::ArrayView2;

use crate::classifier::SourceClassifier;
use crate::clump::{Clump, ClumpFinder};
use crate::config::SelectorConfig;
use crate::distortion::{MomentCorrector, NoDistortion};
use crate::error::SelectionError;
use crate::histogram::MomentHistogram;
use crate::image_proc::{CandidateBuilder, CutoutBuilder, PsfCandidate};
use crate::observer::{NullObserver, SelectionObserver};
use crate::source::Source;

/// Selects PSF stars by clustering sources in (Ixx, Iyy) space
pub struct SecondMomentStarSelector {
    config: SelectorConfig,
    corrector: Box<dyn MomentCorrector>,
    builder: Box<dyn CandidateBuilder>,
    clump_finder: ClumpFinder,
    observer: Box<dyn SelectionObserver>,
}

impl SecondMomentStarSelector {
    /// Selector with no distortion correction and the default collaborators
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            corrector: Box::new(NoDistortion),
            builder: Box::new(CutoutBuilder),
            clump_finder: ClumpFinder::default(),
            observer: Box::new(NullObserver),
        }
    }

    /// Correct source moments for optical distortion in both passes
    pub fn with_corrector(mut self, corrector: Box<dyn MomentCorrector>) -> Self {
        self.corrector = corrector;
        self
    }

    pub fn with_candidate_builder(mut self, builder: Box<dyn CandidateBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_clump_finder(mut self, clump_finder: ClumpFinder) -> Self {
        self.clump_finder = clump_finder;
        self
    }

    pub fn with_observer(mut self, observer: Box<dyn SelectionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Whether source moments are corrected for distortion before clustering
    pub fn corrects_distortion(&self) -> bool {
        !self.corrector.is_identity()
    }

    /// Build the moment histogram from the good sources
    pub fn build_histogram(&self, sources: &[Source]) -> MomentHistogram {
        let classifier = self.classifier();
        let mut histogram = MomentHistogram::new(self.config.histogram);
        for source in sources {
            let good = classifier.is_good_source(source);
            if good {
                histogram.insert(source, self.corrector.as_ref());
            }
            self.observer.source_histogrammed(source, good);
        }
        histogram
    }

    /// Find the clumps of the good sources' moment histogram
    pub fn find_clumps(&self, sources: &[Source]) -> Result<Vec<Clump>, SelectionError> {
        let histogram = self.build_histogram(sources);
        let clumps = self
            .clump_finder
            .find_clumps(&histogram, self.config.histogram_sigma)?;
        self.observer.clumps_found(&clumps);
        Ok(clumps)
    }

    /// Return PSF candidates for the likely stars in `sources`.
    ///
    /// Accepted sources are flagged as stars in place.
    ///
    /// # Errors
    /// * `SelectionError::NoCandidates` - no good source landed in the histogram
    /// * `SelectionError::ClumpDetectionFailed` - the histogram had no measurable peak
    pub fn select_stars(
        &self,
        image: ArrayView2<f64>,
        sources: &mut [Source],
    ) -> Result<Vec<PsfCandidate>, SelectionError> {
        if self.corrects_distortion() {
            debug!("Correcting moments of {} sources for distortion", sources.len());
        }
        let clumps = self.find_clumps(sources)?;
        let candidates = self.classifier().select_stars(
            image,
            sources,
            &clumps,
            self.config.clump_n_sigma,
        );

        info!(
            "Selected {} PSF candidates from {} sources using {} clump(s)",
            candidates.len(),
            sources.len(),
            clumps.len()
        );
        Ok(candidates)
    }

    fn classifier(&self) -> SourceClassifier<'_> {
        SourceClassifier::new(&self.config, self.corrector.as_ref(), self.builder.as_ref())
            .with_observer(self.observer.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::RadialPolyDistortion;
    use crate::source::{Moments, SourceFlags};
    use ndarray::Array2;

    fn population() -> Vec<Source> {
        let mut sources = Vec::new();
        for i in 0..30u64 {
            let dx = (i % 3) as f64 * 0.1;
            let dy = (i / 10) as f64 * 0.1;
            let pos = 20.0 + 5.0 * i as f64;
            sources.push(Source::new(
                i,
                pos,
                200.0 - pos,
                Moments::new(4.0 + dx, 0.0, 4.0 + dy),
                1e4,
            ));
        }
        // Galaxies, spread out in moment space
        for (k, &(ixx, iyy)) in [(12.0, 15.0), (20.0, 9.0), (25.0, 25.0)].iter().enumerate() {
            sources.push(Source::new(
                100 + k as u64,
                100.0,
                100.0,
                Moments::new(ixx, 0.0, iyy),
                1e4,
            ));
        }
        sources
    }

    #[test]
    fn test_selects_cluster_only() {
        let image = Array2::from_elem((220, 220), 5.0);
        let mut sources = population();
        let selector = SecondMomentStarSelector::new(SelectorConfig::default());

        let candidates = selector.select_stars(image.view(), &mut sources).unwrap();

        assert_eq!(candidates.len(), 30);
        for s in &sources {
            assert_eq!(s.is_star(), s.id < 100, "source {}", s.id);
        }
    }

    #[test]
    fn test_only_bad_sources_is_no_candidates() {
        let image = Array2::from_elem((220, 220), 5.0);
        let mut sources: Vec<Source> = population()
            .into_iter()
            .map(|s| s.with_flags(SourceFlags::SATUR_CENTER))
            .collect();
        let selector = SecondMomentStarSelector::new(SelectorConfig::default());

        assert_eq!(
            selector.select_stars(image.view(), &mut sources),
            Err(SelectionError::NoCandidates)
        );
        assert!(sources.iter().all(|s| !s.is_star()));
    }

    #[test]
    fn test_corrects_distortion_follows_corrector() {
        let plain = SecondMomentStarSelector::new(SelectorConfig::default());
        assert!(!plain.corrects_distortion());

        let identity = RadialPolyDistortion::new(vec![0.0, 1.0], (0.0, 0.0)).unwrap();
        let flat = SecondMomentStarSelector::new(SelectorConfig::default())
            .with_corrector(Box::new(identity));
        assert!(!flat.corrects_distortion());

        let radial =
            RadialPolyDistortion::centered_on_detector(vec![0.0, 1.0, 2.0e-4], 100, 100).unwrap();
        let corrected = SecondMomentStarSelector::new(SelectorConfig::default())
            .with_corrector(Box::new(radial));
        assert!(corrected.corrects_distortion());
    }

    #[test]
    fn test_histogram_skips_bad_sources() {
        let mut sources = population();
        sources[0].flags = SourceFlags::EDGE;
        sources[1].psf_flux = 10.0;
        let selector = SecondMomentStarSelector::new(SelectorConfig::default());

        let histogram = selector.build_histogram(&sources);
        assert_eq!(histogram.total(), sources.len() as u64 - 2);
    }
}
