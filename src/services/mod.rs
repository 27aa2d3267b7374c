pub mod aggregator;
pub mod classification;
pub mod monitoring;
pub mod progress;
pub mod quiz;
pub mod unlock;

pub use aggregator::ProgressAggregator;
pub use monitoring::MonitoringService;
pub use progress::ProgressService;
pub use quiz::QuizService;
pub use unlock::UnlockEngine;

use crate::database::DatabaseError;

/// Business-level failures shared by every service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// `round(100 * part / whole)`, or 0 when `whole` is 0. Halves round up.
pub fn percentage(part: usize, whole: usize) -> i32 {
    if whole == 0 {
        return 0;
    }
    ((part as f64 / whole as f64) * 100.0).round() as i32
}
