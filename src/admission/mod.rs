//! Job admission: request validation, scope authorization, and hand-off to
//! the task queue.

pub mod handler;
pub mod model;
pub mod scopes;
pub mod validator;

pub use handler::JobAdmissionHandler;
pub use model::{AuthenticatedCaller, JobRequest, RawJobFields};
pub use scopes::ScopeAuthorizer;
pub use validator::{JobRequestValidator, ValidationFailure};
