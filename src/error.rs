use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Azione non valida: {0}")]
    InvalidAction(String),

    #[error("Parametri non validi: {0}")]
    InvalidParameters(String),

    #[error("Immagine non trovata: {0}")]
    ResourceNotFound(String),

    #[error("Job non trovato: {0}")]
    JobNotFound(String),

    #[error("Trasformazione fallita: {0}")]
    TransformFailure(String),

    #[error("Formato non supportato: {0}")]
    UnsupportedFormat(String),

    #[error("Errore dello store: {0}")]
    Store(String),

    #[error("Errore di I/O: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Errore immagine: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Errore interno: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Store(e.to_string())
    }
}

impl AppError {
    /// Errori sollevati all'intake, prima di qualsiasi accodamento
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::InvalidAction(_)
                | AppError::InvalidParameters(_)
                | AppError::ResourceNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_kinds() {
        assert!(AppError::InvalidAction("rotate".into()).is_rejection());
        assert!(AppError::InvalidParameters("size".into()).is_rejection());
        assert!(AppError::ResourceNotFound("abc".into()).is_rejection());
        assert!(!AppError::TransformFailure("corrupt".into()).is_rejection());
        assert!(!AppError::JobNotFound("job-1".into()).is_rejection());
    }

    #[test]
    fn test_display_carries_detail() {
        let err = AppError::TransformFailure("file troncato".into());
        assert!(err.to_string().contains("file troncato"));
    }
}
