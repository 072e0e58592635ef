pub mod output;
pub use output::*;
pub mod section;
pub use section::*;
pub mod layout;
pub use layout::*;
pub mod debug;
pub mod container;
pub use container::*;
pub mod dump;
