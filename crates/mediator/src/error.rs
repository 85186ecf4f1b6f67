use thiserror::Error;

/// Errors returned synchronously by [`crate::Dispatcher`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("the '{0}' event is already registered")]
    AlreadyRegistered(String),
    #[error("the '{0}' event is not registered")]
    NotRegistered(String),
    #[error("dispatcher is shut down")]
    Closed,
}
