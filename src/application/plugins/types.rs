use std::sync::Arc;

use thiserror::Error;

use crate::application::context::RequestContext;
use crate::domain::entities::Entry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin `{id}` is not registered")]
    NotFound { id: String },
    #[error("transform failed: {message}")]
    Transform { message: String },
    #[error("cleanup failed: {message}")]
    Cleanup { message: String },
    #[error("plugin panicked: {message}")]
    Panicked { message: String },
}

impl PluginError {
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    pub fn cleanup(message: impl Into<String>) -> Self {
        Self::Cleanup {
            message: message.into(),
        }
    }
}

/// Entry transformation applied as one step of a request's plugin chain.
///
/// Instances are created per request by the registry, so implementations may
/// keep state in `self` without coordinating with other requests. Entries
/// arrive shared; mutate one through [`Arc::make_mut`] so the cached copy is
/// left untouched.
pub trait Plugin: Send {
    /// Return the entries the rest of the chain should see. Returning an
    /// empty vector ends the request's content.
    fn transform(
        &mut self,
        entries: Vec<Arc<Entry>>,
        ctx: &mut RequestContext,
    ) -> Result<Vec<Arc<Entry>>, PluginError>;

    /// Called once after `transform`, whether it succeeded or not.
    fn cleanup(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}
