use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("username already has a live request")]
    AlreadyRequested,

    #[error("waiting area is at capacity")]
    OutOfSpace,

    #[error("id pool exhausted")]
    OutOfIds,

    #[error("request is already assigned to a pile, can't update in place")]
    IllegalUpdate,

    #[error("no live request for that id or username")]
    MappingNotExisted,

    #[error("no pile with id {0}")]
    PileNotFound(u32),
}
