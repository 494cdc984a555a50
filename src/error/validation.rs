use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid scheme '{scheme}'. Use 'http' or 'https'.")]
    InvalidScheme { scheme: String },
    #[error("Target host must not be empty.")]
    EmptyHost,
}
