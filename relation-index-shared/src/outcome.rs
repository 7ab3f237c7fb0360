//! Tagged result of a lookup against the search engine.

/// Outcome of a single lookup.
///
/// Separates "the engine answered and nothing matched" from "the engine
/// could not be asked", so callers can pick between retrying and accepting
/// an empty answer.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T, E> {
    /// At least one document matched.
    Found(T),
    /// The query ran and matched nothing.
    NotFound,
    /// The query could not be executed.
    Failed(E),
}

impl<T, E> LookupOutcome<T, E> {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The found value, if any.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound | Self::Failed(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LookupOutcome<U, E> {
        match self {
            Self::Found(value) => LookupOutcome::Found(f(value)),
            Self::NotFound => LookupOutcome::NotFound,
            Self::Failed(error) => LookupOutcome::Failed(error),
        }
    }

    /// Collapse into a plain value, using `T::default()` for both
    /// `NotFound` and `Failed`.
    pub fn unwrap_or_default(self) -> T
    where
        T: Default,
    {
        self.found().unwrap_or_default()
    }
}
