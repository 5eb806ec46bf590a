use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("cannot decode admission review: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("admission review does not contain a request")]
    MissingRequest,

    #[error("cannot decode {kind} object: {source}")]
    Object {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("quantity {0:?} does not start with a number")]
    InvalidNumber(String),

    #[error("quantity {0:?} has an unknown suffix")]
    UnknownSuffix(String),

    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

#[derive(Error, Debug)]
pub enum MutationError {
    #[error("object of kind {kind} is not supported")]
    NotSupported { kind: String },

    #[error("container {container:?} has an invalid memory {field}: {source}")]
    InvalidQuantity {
        container: String,
        field: &'static str,
        #[source]
        source: QuantityError,
    },

    #[error("{mutator} failed: {source}")]
    Mutator {
        mutator: String,
        #[source]
        source: Box<MutationError>,
    },
}

impl MutationError {
    /// Name of the innermost mutator that produced the error, if it went
    /// through a chain.
    pub fn mutator(&self) -> Option<&str> {
        match self {
            MutationError::Mutator { mutator, source } => source.mutator().or(Some(mutator)),
            _ => None,
        }
    }

    pub fn is_not_supported(&self) -> bool {
        match self {
            MutationError::NotSupported { .. } => true,
            MutationError::Mutator { source, .. } => source.is_not_supported(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("cannot serialize object: {0}")]
    Serialize(#[source] serde_json::Error),
}
