pub mod job;
pub mod locator;
pub mod segment;
pub mod transcript;

pub use job::*;
pub use locator::*;
pub use segment::*;
pub use transcript::*;
