/// Convenience result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Each variant maps to one containment boundary: source errors stop at the
/// poller, render errors at the slide, transport errors at the sink, and only
/// lifecycle errors surface to the control caller.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Invalid user-provided configuration or descriptor data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A data-source fetch failed; isolated to that source.
    #[error("source error: {0}")]
    Source(String),

    /// A slide failed to draw against the current cache contents.
    #[error("render error: {0}")]
    Render(String),

    /// The frame sink could not deliver a frame.
    #[error("transport error: {0}")]
    Transport(String),

    /// A control call arrived in a state that cannot honor it.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Build an [`EngineError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build an [`EngineError::Source`] value.
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Build an [`EngineError::Render`] value.
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Build an [`EngineError::Transport`] value.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Build an [`EngineError::Lifecycle`] value.
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }
}
