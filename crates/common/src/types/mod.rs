mod content;
mod job;
mod publisher;

pub use content::*;
pub use job::*;
pub use publisher::*;
