pub mod node;
pub mod version;
pub mod version_set;
pub mod write_concern;

pub use node::{find_node, primary_node, Node};
pub use version::{Columns, Record, StalenessMap, Value, Version};
pub use version_set::VersionSet;
pub use write_concern::{ReadPreference, WriteConcern};
