use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("image should be loaded first")]
    UnloadedImage,

    #[error("failed to decode image: {0}")]
    ImageDecodingFailed(String),

    #[error("allocation failed while building {0}")]
    AllocationFailure(&'static str),

    #[error("curve optimization incomplete; unoptimized curve kept")]
    OptimizationIncomplete,
}
