// handlers/protected/mod.rs - Learner handlers
//
// Security Level: any valid JWT
// Middleware: jwt_auth_middleware (AuthUser in request extensions)

pub mod progress;
pub mod quiz;
