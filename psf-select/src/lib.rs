//! Second-moment PSF star selection
//!
//! Picks the point sources of an exposure out of a detected source catalog so
//! they can be used to model the PSF. Stars share the PSF's shape, so their
//! second moments pile up in a single clump of the (Ixx, Iyy) plane while
//! galaxies, blends and cosmic rays scatter around it.
//!
//! The pipeline:
//! 1. [`MomentHistogram`] bins the distortion-corrected moments of good sources
//! 2. [`ClumpFinder`] locates the histogram peaks and their spread
//! 3. [`SourceClassifier`] accepts sources within an elliptical distance of a
//!    clump and cuts a [`PsfCandidate`] stamp for each
//!
//! [`SecondMomentStarSelector`] runs all three with one [`SelectorConfig`].

pub mod classifier;
pub mod clump;
pub mod config;
pub mod distortion;
pub mod error;
pub mod histogram;
pub mod image_proc;
pub mod observer;
pub mod selector;
pub mod source;

pub use classifier::{is_good_source, SourceClassifier};
pub use clump::{Clump, ClumpFinder, IZZ_MIN};
pub use config::{ConfigError, SelectorConfig};
pub use distortion::{MomentCorrector, NoDistortion, RadialPolyDistortion};
pub use error::SelectionError;
pub use histogram::{HistogramConfig, MomentHistogram};
pub use image_proc::{CandidateBuilder, CutoutBuilder, PsfCandidate};
pub use observer::{NullObserver, RejectionReason, SelectionObserver};
pub use selector::SecondMomentStarSelector;
pub use source::{Moments, Source, SourceFlags};
