/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f32 = 1e-10;

/// Conversion factor from Gaussian FWHM to sigma: 1 / (2 * sqrt(2 * ln 2)).
pub const FWHM_TO_SIGMA: f64 = 0.424_660_900_144_009_5;

/// Unit assigned to frames whose header carries no BUNIT card.
pub const DEFAULT_UNIT: &str = "adu";

/// Default lower rejection threshold (in standard deviations) for sigma clipping
/// during frame combination.
pub const DEFAULT_CLIP_LOW: f32 = 3.0;

/// Default upper rejection threshold (in standard deviations) for sigma clipping
/// during frame combination.
pub const DEFAULT_CLIP_HIGH: f32 = 3.0;

/// Default number of rejection passes during frame combination.
pub const DEFAULT_CLIP_ITERATIONS: usize = 1;

/// Sigma threshold for sigma-clipped background statistics.
pub const DEFAULT_BACKGROUND_SIGMA: f32 = 3.0;

/// Maximum iterations for sigma-clipped background statistics.
pub const DEFAULT_BACKGROUND_MAX_ITERS: usize = 5;

/// Default detection threshold, in multiples of the background standard deviation.
pub const DEFAULT_DETECTION_THRESHOLD: f64 = 3.0;

/// Default expected point-source FWHM in pixels.
pub const DEFAULT_FWHM: f64 = 3.0;

/// Truncation radius of the detection kernel, in Gaussian sigmas.
pub const DEFAULT_SIGMA_RADIUS: f64 = 1.5;

/// Lower and upper bounds on the sharpness of an accepted detection.
pub const DEFAULT_SHARPLO: f64 = 0.2;
pub const DEFAULT_SHARPHI: f64 = 1.0;

/// Lower and upper bounds on the roundness of an accepted detection.
pub const DEFAULT_ROUNDLO: f64 = -1.0;
pub const DEFAULT_ROUNDHI: f64 = 1.0;

/// Floor on the detection threshold as a fraction of the strongest filtered
/// response. Only matters when the background noise is (near) zero.
pub const MIN_RELATIVE_AMPLITUDE: f64 = 1e-4;

/// Default cutout size (pixels, odd) used when refining source positions.
pub const DEFAULT_CENTROID_BOX_SIZE: usize = 11;

/// Default fitting box (pixels, odd) for the quadratic centroid estimator.
pub const DEFAULT_QUADRATIC_FIT_BOXSIZE: usize = 5;

/// Default iteration cap for Gaussian profile fits.
pub const DEFAULT_FIT_MAX_ITERATIONS: usize = 100;

/// Default number of sub-samples per pixel axis for aperture sums.
pub const DEFAULT_SUBPIXELS: u32 = 5;

/// Longest string value that fits in a single FITS header card.
pub const FITS_MAX_STRING_LEN: usize = 68;
