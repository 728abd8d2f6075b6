//! Cross-cutting command metadata.

use serde::{Deserialize, Serialize};

/// Audit metadata passed alongside a command when its events are persisted.
///
/// Carries who issued the change and which request it belongs to without
/// polluting the domain events themselves. Fields are copied onto
/// [`EventMetadata`](crate::event::EventMetadata) when events are appended.
///
/// # Examples
///
/// ```
/// use address_registry_es::CommandContext;
///
/// let ctx = CommandContext::default()
///     .with_actor("dawa-import")
///     .with_correlation_id("batch-2024-07-01");
///
/// assert_eq!(ctx.actor.as_deref(), Some("dawa-import"));
/// assert_eq!(ctx.correlation_id.as_deref(), Some("batch-2024-07-01"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandContext {
    /// Identity of the actor issuing the command (user or import job).
    pub actor: Option<String>,
    /// Correlation ID for tracing a request across aggregates.
    pub correlation_id: Option<String>,
}

impl CommandContext {
    /// Set the actor identity.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set the correlation ID.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}
