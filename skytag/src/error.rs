/// Expected resolution failures. None of these abort the caller; they are
/// the sentinel outcomes of the public resolve surface.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("tag not found: {0}")]
    NotFound(String),
    #[error("indirection cycle or recursion exhausted at '{0}'")]
    CycleExhausted(String),
    #[error("mirror index {index} does not exist for '{tag}'")]
    NoSuchMirror { tag: String, index: usize },
}

impl ResolveError {
    /// Whether this failure points at a dictionary authoring defect rather
    /// than a merely missing entry.
    pub fn is_authoring_defect(&self) -> bool {
        matches!(self, Self::CycleExhausted(_) | Self::NoSuchMirror { .. })
    }
}

/// Failures while loading a record source. Records committed before the
/// failure stay in the store.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("dictionary read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote dictionary fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
}
