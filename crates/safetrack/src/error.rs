use crate::compliance::{
    AssignmentError, GapAnalysisError, RegistryError, RosterImportError, ScoringError, StoreError,
};
use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Store(StoreError),
    Assignment(AssignmentError),
    GapAnalysis(GapAnalysisError),
    Scoring(ScoringError),
    Registry(RegistryError),
    Import(RosterImportError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
            AppError::Assignment(err) => write!(f, "assignment error: {}", err),
            AppError::GapAnalysis(err) => write!(f, "gap analysis error: {}", err),
            AppError::Scoring(err) => write!(f, "scoring error: {}", err),
            AppError::Registry(err) => write!(f, "registry error: {}", err),
            AppError::Import(err) => write!(f, "roster import error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Assignment(err) => Some(err),
            AppError::GapAnalysis(err) => Some(err),
            AppError::Scoring(err) => Some(err),
            AppError::Registry(err) => Some(err),
            AppError::Import(err) => Some(err),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Assignment(AssignmentError::MissingWorkerId)
            | AppError::Registry(
                RegistryError::InvalidTemporaryFix { .. } | RegistryError::IncompleteWorker,
            )
            | AppError::Import(RosterImportError::Csv(_)) => StatusCode::BAD_REQUEST,
            AppError::GapAnalysis(GapAnalysisError::WorkerNotFound(_))
            | AppError::Scoring(ScoringError::WorkerNotFound(_))
            | AppError::Registry(
                RegistryError::WorkerNotFound(_)
                | RegistryError::RoleNotFound(_)
                | RegistryError::WorkerRoleNotFound(_)
                | RegistryError::HazardNotFound(_)
                | RegistryError::ControlNotFound(_)
                | RegistryError::RequiredControlNotFound(_),
            ) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::Conflict(_))
            | AppError::Assignment(AssignmentError::Store(StoreError::Conflict(_)))
            | AppError::GapAnalysis(GapAnalysisError::Store(StoreError::Conflict(_)))
            | AppError::Scoring(ScoringError::Store(StoreError::Conflict(_)))
            | AppError::Registry(RegistryError::Store(StoreError::Conflict(_))) => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "success": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<AssignmentError> for AppError {
    fn from(value: AssignmentError) -> Self {
        Self::Assignment(value)
    }
}

impl From<GapAnalysisError> for AppError {
    fn from(value: GapAnalysisError) -> Self {
        Self::GapAnalysis(value)
    }
}

impl From<ScoringError> for AppError {
    fn from(value: ScoringError) -> Self {
        Self::Scoring(value)
    }
}

impl From<RegistryError> for AppError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

impl From<RosterImportError> for AppError {
    fn from(value: RosterImportError) -> Self {
        Self::Import(value)
    }
}
