// handlers/elevated/mod.rs - Admin handlers
//
// Security Level: JWT with role admin or superadmin
// Middleware: jwt_auth_middleware → require_admin

pub mod monitoring;
