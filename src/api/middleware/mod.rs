pub mod jwt_extractor;
pub mod rbac;
pub mod trace_id;

pub use jwt_extractor::{jwt_extractor_middleware, JwtAuthContext};
pub use rbac::{require_admin, require_role, roles};
pub use trace_id::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
