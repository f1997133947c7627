mod source_factory;

pub use source_factory::{SourceDependencies, SourceFactory};
