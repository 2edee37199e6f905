mod front_matter;
mod history;
mod lock;
mod model;
mod store;

pub use front_matter::{FrontMatter, Value};
pub use history::{Snapshot, VersionedText, line_change_sum};
pub use lock::LockRegistry;
pub use model::{LockState, Page, PageJson};
pub use store::PageStore;
