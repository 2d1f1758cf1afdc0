pub mod data;
pub mod hashing;
pub mod attribute;
pub mod instance;
pub mod resource_type;
pub mod format;
pub mod file;
pub mod result;
pub mod manager;
pub mod error;

pub use data::{Block, ByteOrder, Reader, Writer};
pub use attribute::Attributes;
pub use instance::Instance;
pub use resource_type::ResourceType;
pub use format::{Format, SNIFF_ORDER};
pub use file::{File, ReadOptions};
pub use result::QueryResult;
pub use manager::{with_shared, Manager};
pub use error::{ResourceError, Result};
