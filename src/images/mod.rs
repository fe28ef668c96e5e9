//! Image-caching proxy.
//!
//! External images are copied to an object store (S3-compatible bucket or a
//! local CDN directory) once, keyed by the SHA-256 of their URL, so pages
//! can link the stable CDN copy instead of hotlinking the source.

pub mod cache;
pub mod store;

pub use cache::{url_hash, CachedImage, ImageCache, ImageCacheError};
pub use store::{build_store, LocalStore, ObjectStore, S3Store, StoreError};
