#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Odb(#[from] wt_odb::OdbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
