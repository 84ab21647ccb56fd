use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("pool for '{name}' already exists")]
    AlreadyRegistered { name: String },

    #[error("no pool registered for '{name}'")]
    NotRegistered { name: String },

    #[error("pool '{name}' holds values of type {registered}, not {requested}")]
    TypeMismatch { name: String, registered: &'static str, requested: &'static str },

    #[error("the global server pool has already been initialized")]
    GlobalAlreadyInitialized,
}

impl PoolError {
    pub fn already_registered<S: ToString>(name: S) -> Self {
        Self::AlreadyRegistered { name: name.to_string() }
    }

    pub fn not_registered<S: ToString>(name: S) -> Self {
        Self::NotRegistered { name: name.to_string() }
    }

    pub fn type_mismatch<S: ToString>(name: S, registered: &'static str, requested: &'static str) -> Self {
        Self::TypeMismatch { name: name.to_string(), registered, requested }
    }
}
