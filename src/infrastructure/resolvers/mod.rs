//! Source resolvers for each kind of image source.

mod bundle;
mod file;
mod registry;
mod resource;
mod stream;
pub mod url;

pub use bundle::BundleResolver;
pub use file::FileResolver;
pub use registry::ResolverRegistry;
pub use resource::ResourceCatalog;
pub use stream::StreamResolver;
pub use url::UrlResolver;
