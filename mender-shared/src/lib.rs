pub mod compose;
pub mod image;

pub use compose::{ComposeFile, ComposeService, ManifestError, VersionType};
pub use image::ImageRef;
