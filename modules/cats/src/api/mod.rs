pub mod controller;
pub mod filter;
pub mod guard;
pub mod interceptor;

pub use controller::{cats_controller, CatsController};
pub use filter::CatsErrorFilter;
pub use guard::{Principal, Role, RolesGuard, ROLES};
pub use interceptor::TimingInterceptor;
