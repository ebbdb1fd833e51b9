use crate::fsutil::JsonFileError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unterminated action in template `{0}`")]
    UnterminatedAction(String),
    #[error("unknown action `{action}` in template `{template}`")]
    UnknownAction { action: String, template: String },
    #[error("no predefined exporter named `{0}`")]
    UnknownExporter(String),
    #[error("invalid name pattern for exporter `{exporter_type}`: {source}")]
    InvalidPattern {
        exporter_type: String,
        #[source]
        source: regex::Error,
    },
    #[error("failed to render {field} of exporter `{exporter_type}` for `{task}`: {source}")]
    Render {
        exporter_type: String,
        task: String,
        field: &'static str,
        #[source]
        source: Box<Error>,
    },
    #[error("failed to load exporter catalog: {0}")]
    Load(#[from] JsonFileError),
}

pub type Result<T> = std::result::Result<T, Error>;
