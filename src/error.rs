#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;
