use thiserror::Error;

/// Errors that can occur while parsing or resolving VAST documents
#[derive(Error, Debug)]
pub enum VastError {
    #[error("Failed to parse XML: {0}")]
    XmlParseError(#[from] quick_xml::Error),

    #[error("Missing VAST root element")]
    MissingRoot,

    #[error("No Ad with an InLine or Wrapper element")]
    NoAd,

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid ad pod payload: {0}")]
    InvalidPayload(String),

    #[error("Ad group has no items")]
    EmptyGroup,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to fetch URL: HTTP status {0}")]
    HttpStatus(u16),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unexpected end of file")]
    UnexpectedEof,
}

pub type Result<T> = std::result::Result<T, VastError>;
