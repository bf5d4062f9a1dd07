/// Minimum IoU (exclusive) for a detection to continue a tracked identity.
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.5;

/// Motion model noise. Process noise is much smaller than measurement noise,
/// so estimates favour smoothing over fast reaction.
pub const DEFAULT_PROCESS_NOISE: f64 = 1e-4;
pub const DEFAULT_MEASUREMENT_NOISE: f64 = 1e-1;

/// Diagonal of the covariance a new estimator starts with.
pub const DEFAULT_INITIAL_UNCERTAINTY: f64 = 1.0;

pub const DEFAULT_DATABASE_PATH: &str = "faces.db";

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
