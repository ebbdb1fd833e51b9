#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such container: {0}")]
    NotFound(String),
    #[error("{message} (status {status_code})")]
    Daemon { status_code: u16, message: String },
    #[error("docker request failed: {0}")]
    Docker(#[source] bollard::errors::Error),
    #[error("invalid container reported by runtime: {0}")]
    InvalidContainer(#[from] crate::container::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Returns true if the daemon refused the request because the resource already exists,
    /// e.g. a container name already in use.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Daemon {
                status_code: 409,
                ..
            }
        )
    }

    /// Maps a bollard error, turning daemon 404 replies into [`Error::NotFound`] for `id`.
    pub(super) fn from_docker(id: &str, err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => Error::NotFound(id.to_owned()),
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Error::Daemon {
                status_code,
                message,
            },
            other => Error::Docker(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
