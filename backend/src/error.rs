use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("no piles configured for this station")]
    NoPilesConfigured,
}
