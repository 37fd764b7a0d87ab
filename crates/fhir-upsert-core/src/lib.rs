pub mod error;
pub mod id;
pub mod resource;
pub mod version;

pub use error::{CoreError, Result};
pub use id::{IdError, generate_id, validate_id};
pub use resource::Resource;
pub use version::VersionToken;
