use model::core::identifiers::Location;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Remote task at {location} failed: {message}")]
    RemoteTaskFailed { location: Location, message: String },

    #[error("Location {0} was never announced and no more locations are expected")]
    UnknownLocation(Location),

    #[error("Exchange is closed")]
    Closed,
}
