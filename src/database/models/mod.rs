pub mod content;
pub mod progress;
pub mod quiz;
pub mod user;

pub use content::{Module, PoinDetail, SubMaterial};
pub use progress::{ModuleProgress, PoinProgress, SubMaterialProgress};
pub use quiz::{AnswerRecord, Quiz, QuizAttempt, QuizQuestion};
pub use user::Profile;
