use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Every slice has a value of zero, so there is nothing to partition the circle by.
    #[error("total slice value is zero; the layout is undefined")]
    DegenerateInput,
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("failed to triangulate wedge {index}: {reason}")]
    Triangulation { index: usize, reason: String },
}

impl GeometryError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidGeometry(reason.into())
    }
}
