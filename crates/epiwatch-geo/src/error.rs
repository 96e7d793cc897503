use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

impl GeoError {
    pub fn invalid_polygon(message: impl Into<String>) -> Self {
        Self::InvalidPolygon(message.into())
    }
}

impl From<epiwatch_core::CoreError> for GeoError {
    fn from(err: epiwatch_core::CoreError) -> Self {
        Self::InvalidCoordinate(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GeoError>;
