use crate::errors::EngineError;

/// Outcome of one task: exactly one variant, captured positionally by the
/// limiter so that a rejection never disturbs its siblings.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement<T> {
    Fulfilled(T),
    Rejected(EngineError),
}

impl<T> Settlement<T> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Settlement::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Settlement::Rejected(_))
    }

    pub fn fulfilled(&self) -> Option<&T> {
        match self {
            Settlement::Fulfilled(value) => Some(value),
            Settlement::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&EngineError> {
        match self {
            Settlement::Fulfilled(_) => None,
            Settlement::Rejected(reason) => Some(reason),
        }
    }
}

impl<T> From<Result<T, EngineError>> for Settlement<T> {
    fn from(outcome: Result<T, EngineError>) -> Self {
        match outcome {
            Ok(value) => Settlement::Fulfilled(value),
            Err(reason) => Settlement::Rejected(reason),
        }
    }
}
