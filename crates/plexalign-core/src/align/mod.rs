pub mod phase_correlation;
pub mod shift;
pub mod upsample;

pub use phase_correlation::{estimate_frames, estimate_translation};
pub use shift::{shift_array, shift_frame, BoundaryPolicy};
