use thiserror::Error;

#[derive(Error, Debug)]
pub enum CcdError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Shape mismatch in {context}: {shapes:?}")]
    ShapeMismatch {
        context: String,
        shapes: Vec<(usize, usize)>,
    },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid positions: {0}")]
    InvalidPositions(String),

    #[error("Invalid aperture: {0}")]
    InvalidAperture(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported {kind}: {name:?}")]
    UnsupportedMethod { kind: &'static str, name: String },

    #[error("Empty frame sequence")]
    EmptySequence,
}

impl CcdError {
    pub(crate) fn shape_mismatch(context: &str, shapes: Vec<(usize, usize)>) -> Self {
        Self::ShapeMismatch {
            context: context.to_string(),
            shapes,
        }
    }
}

pub type Result<T> = std::result::Result<T, CcdError>;
