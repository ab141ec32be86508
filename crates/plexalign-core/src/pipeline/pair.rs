use tracing::{info, warn};

use crate::align::{estimate_translation, shift_frame};
use crate::canvas::{canonical_canvas, pad_to_canvas, Canvas};
use crate::consts::LOW_CONFIDENCE_ERROR;
use crate::downsample::{decimate, decimation_factor, rescale};
use crate::error::{RegistrationError, Result};
use crate::frame::{Frame, Shift};

use super::config::RegistrationConfig;
use super::types::RoundRegistration;

/// Result of registering one moving frame onto one fixed frame.
#[derive(Clone, Debug)]
pub struct PairRegistration {
    pub canvas: Canvas,
    pub decimation_factor: usize,
    pub registration: RoundRegistration,
    /// Fixed frame padded to the shared canvas.
    pub fixed: Frame,
    /// Moving frame padded to the shared canvas and shifted onto `fixed`.
    pub moving: Frame,
}

/// Register a single moving frame onto a fixed frame.
///
/// Both frames are padded to their shared canvas; the moving frame is then
/// shifted by the estimated translation under `config.boundary`.
pub fn register_pair(
    fixed: &Frame,
    moving: &Frame,
    config: &RegistrationConfig,
) -> Result<PairRegistration> {
    let canvas = canonical_canvas([fixed.data.dim(), moving.data.dim()])?;
    let fixed = Frame::new(
        pad_to_canvas(fixed.data.clone(), canvas)?,
        fixed.original_bit_depth,
    );
    let moving = Frame::new(
        pad_to_canvas(moving.data.clone(), canvas)?,
        moving.original_bit_depth,
    );

    let factor = decimation_factor(canvas.max_dimension(), config.downsample_threshold);
    let registration = match estimate_translation(
        &decimate(&fixed.data, factor),
        &decimate(&moving.data, factor),
        factor,
    ) {
        Ok(estimate) => RoundRegistration {
            shift: rescale(estimate.shift, factor),
            error: estimate.error,
            phase: estimate.phase,
            low_confidence: false,
        },
        Err(RegistrationError::LowSignal { which }) => {
            warn!(which, "Uniform frame, keeping zero shift");
            RoundRegistration {
                shift: Shift::zero(),
                error: LOW_CONFIDENCE_ERROR,
                phase: 0.0,
                low_confidence: true,
            }
        }
        Err(e) => return Err(e),
    };

    info!(
        factor,
        dy = registration.shift.dy,
        dx = registration.shift.dx,
        error = registration.error,
        "Registered pair"
    );

    let moving = shift_frame(&moving, registration.shift, config.boundary);
    Ok(PairRegistration {
        canvas,
        decimation_factor: factor,
        registration,
        fixed,
        moving,
    })
}
