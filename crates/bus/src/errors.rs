use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Frame bus unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
}
