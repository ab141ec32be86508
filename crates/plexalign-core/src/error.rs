use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Estimated peak memory {required} bytes exceeds budget of {budget} bytes")]
    OutOfMemoryBudget { required: u64, budget: u64 },

    #[error("Insufficient signal for phase correlation ({which} frame is uniform)")]
    LowSignal { which: &'static str },

    #[error("Frame {height}x{width} cannot be reconciled to canvas {canvas_height}x{canvas_width}")]
    ShapeMismatch {
        height: usize,
        width: usize,
        canvas_height: usize,
        canvas_width: usize,
    },

    #[error("Frame {0} is listed more than once")]
    DuplicateFrame(String),

    #[error("Anchor round {0} is not part of the registration set")]
    AnchorNotFound(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),
}

impl RegistrationError {
    /// Whether the error is contained to a single round rather than the run.
    pub fn is_round_local(&self) -> bool {
        matches!(
            self,
            Self::LowSignal { .. } | Self::Io(_) | Self::Image(_) | Self::InvalidDimensions { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistrationError>;
