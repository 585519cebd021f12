pub mod attendance;
pub mod employees;
pub mod enroll;
pub mod health_check;
pub mod identify;

pub use attendance::*;
pub use employees::*;
pub use enroll::*;
pub use health_check::*;
pub use identify::*;
