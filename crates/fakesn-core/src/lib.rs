pub mod catalog;
pub mod consts;
pub mod coordinator;
pub mod detect;
pub mod error;
pub mod image;
pub mod inject;
pub mod io;
pub mod matching;
pub mod pipeline;
pub mod provenance;
pub mod psf;
pub mod stats;
