// handlers/mod.rs - 3-Tier Handler Architecture
//
// Public (no auth) → Protected (JWT auth) → Elevated (JWT auth + admin role)
//
pub mod public; // Tier 1: No authentication required (/, /health)
pub mod protected; // Tier 2: JWT authentication required (/api/v1/quizzes/*, /api/v1/progress/*)
pub mod elevated; // Tier 3: Admin or superadmin JWT required (/api/v1/admin/*)
