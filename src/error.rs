use thiserror::Error;

/// 导入流程错误, 每种都需要前端给出不同提示
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not parse file: {0}")]
    Parse(String),

    #[error("required fields are not mapped: {}", .0.join(", "))]
    MissingRequiredMapping(Vec<String>),

    #[error("no valid rows to import ({skipped} rows skipped)")]
    NoValidRows { skipped: usize },

    #[error("insert failed: {0}")]
    InsertFailure(String),

    #[error("unknown target field: {0}")]
    UnknownTargetField(String),

    #[error("unknown source column: {0}")]
    UnknownSourceColumn(String),

    #[error("import session {0} not found")]
    SessionNotFound(u64),

    #[error("import session {0} is already importing")]
    ImportInProgress(u64),

    #[error("import was interrupted: {0}")]
    Interrupted(String),
}

impl ImportError {
    /// 错误类别 (返回给前端的 kind 字段)
    pub fn kind(&self) -> &'static str {
        match self {
            ImportError::Parse(_) => "parse_error",
            ImportError::MissingRequiredMapping(_) => "missing_required_mapping",
            ImportError::NoValidRows { .. } => "no_valid_rows",
            ImportError::InsertFailure(_) => "insert_failure",
            ImportError::UnknownTargetField(_) => "unknown_target_field",
            ImportError::UnknownSourceColumn(_) => "unknown_source_column",
            ImportError::SessionNotFound(_) => "session_not_found",
            ImportError::ImportInProgress(_) => "import_in_progress",
            ImportError::Interrupted(_) => "interrupted",
        }
    }
}

impl From<csv::Error> for ImportError {
    fn from(e: csv::Error) -> Self {
        ImportError::Parse(e.to_string())
    }
}

/// 图片识别错误
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("vision API is not configured")]
    NotConfigured,

    #[error("vision API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("vision API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid vision API response: {0}")]
    InvalidResponse(String),
}
