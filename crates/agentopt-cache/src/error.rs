use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid cache capacity: {0}")]
    InvalidCapacity(usize),

    #[error("In-flight computation abandoned: key={0}")]
    Abandoned(String),
}
