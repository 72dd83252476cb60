use thiserror::Error;

/// Failures of a single LLM categorization attempt.
///
/// None of these escape the categorizer: they are logged and turned into
/// "no suggestion". [`LlmError::is_parse_failure`] drives the batch retry policy.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("could not start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("{provider} error: {status} {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("empty response")]
    EmptyResponse,
    #[error("response not valid JSON: {0}")]
    MalformedJson(String),
    #[error("response missing required field '{0}'")]
    MissingField(&'static str),
    #[error("response field '{0}' has an invalid value")]
    InvalidField(&'static str),
    #[error("suggestion not in taxonomy: {category} / {subcategory}")]
    NotInTaxonomy {
        category: String,
        subcategory: String,
    },
}

impl LlmError {
    /// The model answered, but not with parseable JSON of the expected shape.
    pub fn is_parse_failure(&self) -> bool {
        matches!(self, LlmError::MalformedJson(_))
    }
}
