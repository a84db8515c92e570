pub mod decode;
pub mod resolver;

pub use resolver::{MetadataResolver, Resolution, ResolutionPath, ResolverSettings};
