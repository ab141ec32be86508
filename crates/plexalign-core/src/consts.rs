/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Minimum number of moving rounds to register them on the Rayon pool.
pub const PARALLEL_ROUND_THRESHOLD: usize = 2;

/// Long-axis length (pixels) per additional step of the decimation factor.
pub const DEFAULT_DOWNSAMPLE_THRESHOLD: usize = 10_000;

/// Fraction of available memory the run may plan to occupy.
pub const DEFAULT_MEMORY_FRACTION: f64 = 0.8;

/// Cross-power bins at or below this magnitude are left unnormalized.
pub const CROSS_POWER_EPSILON: f64 = 1e-12;

/// Non-DC spectral energy at or below this fraction of the total energy
/// marks a frame as uniform.
pub const LOW_SIGNAL_RELATIVE_ENERGY: f64 = 1e-12;

/// Size of the upsampled search region, in original pixels, around the
/// coarse correlation peak.
pub const UPSAMPLED_REGION_PIXELS: f64 = 1.5;

/// Error value recorded for rounds whose estimate degraded to a zero shift.
pub const LOW_CONFIDENCE_ERROR: f64 = 1.0;

/// Rec. 709 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.2125;

/// Rec. 709 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.7154;

/// Rec. 709 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.0721;

/// Number of quantization levels of the 8-bit range reduced frames land in.
pub const EIGHT_BIT_LEVELS: f32 = 255.0;

/// Name of the reference marker in conventional multiplex layouts.
pub const DEFAULT_REFERENCE_MARKER: &str = "DAPI";
