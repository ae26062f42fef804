pub mod builder;
pub mod model;
pub mod stars;

pub use builder::{
    build_epsf, build_epsf_cached, load_epsf, save_epsf, EpsfConfig, EpsfFit, FittedStar,
    IterativeEpsfBuilder, PsfFitter,
};
pub use model::PsfModel;
pub use stars::{extract_psf_stars, CleanStarSet, EpsfStar, PsfStarConfig, SelectionCounts};
