/// Error returned when [crate::DetrendConfig] is rejected
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("PLD order must be positive, got {0}")]
    NonPositivePldOrder(usize),

    #[error("number of cross-validation folds must be at least 1, got {0}")]
    NoFolds(usize),

    #[error("number of GP optimization restarts must be at least 1, got {0}")]
    NoRestarts(usize),

    #[error("lambda grid must hold finite positive values in ascending order, got {0:?}")]
    InvalidLambdaGrid(Vec<f64>),

    #[error("{name} must be finite and {requirement}, got {value}")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("short cadence requires kernel parameters derived from a long cadence model")]
    ShortCadenceWithoutKernel,
}

/// Error returned when an [crate::ObservationBundle] cannot be loaded
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DataError {
    #[error("time series is empty")]
    Empty,

    #[error("{name} has {actual} rows, but there are {expected} cadences")]
    LengthMismatch {
        name: &'static str,
        actual: usize,
        expected: usize,
    },

    #[error("cadence {index} has {actual} pixels, {expected} expected")]
    PixelCountMismatch {
        index: usize,
        actual: usize,
        expected: usize,
    },

    #[error("time must be finite and strictly increasing, violated at cadence {0}")]
    UnsortedTime(usize),

    #[error("breakpoint {breakpoint} is out of order or outside the time series of length {len}")]
    InvalidBreakpoint { breakpoint: usize, len: usize },

    #[error("no finite value to interpolate pixel {0} from")]
    NoFinitePixel(usize),
}

/// Error returned from [crate::Detrender]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DetrendError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("singular {0} matrix")]
    Singular(&'static str),
}
