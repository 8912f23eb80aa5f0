//! Error types for the viewer layer.

use beamline_world::ObserverId;

/// Errors that can occur in the observer registry.
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    /// An observer id was registered twice without an intervening
    /// removal. Ids are issued by the host platform and must be unique
    /// per connection.
    #[error("observer {0} is already registered")]
    AlreadyRegistered(ObserverId),
}
