use std::convert::Infallible;

use serde::Serialize;
use warp::{
    http::StatusCode,
    reject::{self, Rejection},
    Reply,
};

use super::schema::RelationKind;

#[derive(Debug, thiserror::Error)]
#[error("{info}")]
pub struct QueryError {
    info: String,
}

impl QueryError {
    pub fn new(info: String) -> Self {
        Self { info }
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(value: sqlx::Error) -> Self {
        match value {
            sqlx::Error::Database(e) => Self::new(format!("{e}")),
            sqlx::Error::RowNotFound => Self::new(format!("RowNotFound")),
            sqlx::Error::ColumnNotFound(e) => Self::new(format!("Column not found: {e}")),
            sqlx::Error::ColumnDecode { index, source } => {
                Self::new(format!("Column decode {index} ({source})"))
            }
            sqlx::Error::PoolTimedOut => Self::new(format!("Pool timed out")),
            sqlx::Error::PoolClosed => Self::new(format!("Pool closed")),
            sqlx::Error::Migrate(e) => Self::new(format!("{e}")),
            e => Self::new(format!("{e}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for QueryError {
    fn from(value: sqlx::migrate::MigrateError) -> Self {
        Self::new(format!("Migration failed: {value}"))
    }
}

/// Coarse classification used by callers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Internal,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{}", .0.duplicate_message())]
    DuplicateMembership(RelationKind),

    #[error("You can't subscribe to yourself")]
    SelfSubscription,

    #[error("{}", .0.missing_message())]
    NoSuchMembership(RelationKind),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Media error: {0}")]
    Media(String),

    #[error("{0}")]
    Internal(String),

    #[error("Query failed: {0}")]
    Query(#[from] QueryError),
}

impl Error {
    pub fn validation(info: impl Into<String>) -> Self {
        Self::Validation(info.into())
    }

    pub fn not_found(info: impl Into<String>) -> Self {
        Self::NotFound(info.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) | Error::NoSuchMembership(_) => ErrorKind::NotFound,
            Error::Conflict(_) | Error::DuplicateMembership(_) | Error::SelfSubscription => {
                ErrorKind::Conflict
            }
            Error::Unauthorized(_) => ErrorKind::Unauthorized,
            Error::Forbidden(_) => ErrorKind::Forbidden,
            Error::Config(_) | Error::Media(_) | Error::Internal(_) | Error::Query(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        Error::Query(value.into())
    }
}

impl reject::Reject for Error {}

#[derive(Serialize)]
struct ErrorBody {
    errors: String,
}

/// Recover filter turning crate errors (and warp's own rejections) into JSON replies.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message) = if let Some(e) = err.find::<Error>() {
        let kind = e.kind();
        if kind == ErrorKind::Internal {
            log::error!("{e}");
            (kind.status(), String::from("Internal server error"))
        } else {
            (kind.status(), e.to_string())
        }
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("Not found"))
    } else if err.find::<warp::reject::MissingHeader>().is_some() {
        (
            StatusCode::UNAUTHORIZED,
            String::from("Authentication credentials were not provided"),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            String::from("Method not allowed"),
        )
    } else {
        log::trace!("> Unhandled rejection {err:?}");
        (StatusCode::BAD_REQUEST, String::from("Bad request"))
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { errors: message }),
        status,
    ))
}
