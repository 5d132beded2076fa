use std::error::Error as StdError;
use std::fmt;

// Crate-wide result alias
pub type Result<T> = std::result::Result<T, TunerError>;

#[derive(Debug)]
pub enum TunerError {
    ConfigurationError {
        message: String,
        parameter: String,
    },
    DataError {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
    TokenizerError {
        message: String,
    },
    ShapingError {
        message: String,
    },
    BackendError {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl fmt::Display for TunerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunerError::ConfigurationError { message, parameter } => {
                write!(f, "Configuration error for {}: {}", parameter, message)
            }
            TunerError::DataError { message, .. } => {
                write!(f, "Data error: {}", message)
            }
            TunerError::TokenizerError { message } => {
                write!(f, "Tokenizer error: {}", message)
            }
            TunerError::ShapingError { message } => {
                write!(f, "Batch shaping error: {}", message)
            }
            TunerError::BackendError { message, .. } => {
                write!(f, "Backend error: {}", message)
            }
        }
    }
}

impl StdError for TunerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TunerError::DataError { source, .. } => source.as_deref().map(|s| s as _),
            TunerError::BackendError { source, .. } => source.as_deref().map(|s| s as _),
            _ => None,
        }
    }
}

impl From<csv::Error> for TunerError {
    fn from(err: csv::Error) -> Self {
        TunerError::DataError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<candle_core::Error> for TunerError {
    fn from(err: candle_core::Error) -> Self {
        TunerError::BackendError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<std::io::Error> for TunerError {
    fn from(err: std::io::Error) -> Self {
        TunerError::DataError {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
