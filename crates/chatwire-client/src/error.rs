/// Failures seen by a chat client.
///
/// The first three are input guards: they are returned before any request
/// is made and leave the view untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Message is empty")]
    EmptyInput,
    #[error("Message is too long (max {max} characters)")]
    TooLong { max: usize },
    #[error("Please select an AI model to continue.")]
    NoModel,
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Stream(String),
    #[error("{0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_input_guard(&self) -> bool {
        matches!(
            self,
            ClientError::EmptyInput | ClientError::TooLong { .. } | ClientError::NoModel
        )
    }
}
