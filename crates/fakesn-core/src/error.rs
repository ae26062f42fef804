use thiserror::Error;

#[derive(Error, Debug)]
pub enum FakeSnError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Missing header keyword: {0}")]
    MissingHeaderKey(String),

    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Table is missing required column '{0}'")]
    MissingColumn(String),

    #[error("Cannot plant {requested} fakes in one image (maximum {max})")]
    TooManyFakes { requested: usize, max: usize },

    #[error("No stars survived PSF star selection")]
    EmptyStarSet,

    #[error("Image contains no planted fakes")]
    NoFakes,

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ECSV header error: {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("Model serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FakeSnError>;
