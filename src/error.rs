use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A calibration matrix could not be inverted.
    #[error("calibration matrix is singular: {0}")]
    SingularTransform(&'static str),

    /// Serial device failure surfaced by the referee link.
    #[error("serial I/O error: {0}")]
    Serial(#[from] std::io::Error),

    /// The referee link is not connected.
    #[error("serial port is not connected")]
    NotConnected,
}
