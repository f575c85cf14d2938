pub mod enquiry;
pub mod health;
pub mod newsletter;
pub mod report;
pub mod visit;

pub use enquiry::*;
pub use health::*;
pub use newsletter::*;
pub use report::*;
pub use visit::*;
