pub mod directory;
pub mod generator;

pub use directory::LinkDirectory;
pub use generator::{CodeGenerator, RandomCodeGenerator};
