//! Path-addressed hierarchical store.

pub mod path;
pub mod rest;
pub mod store;
pub mod uow;

pub use path::TreePath;
pub use rest::RestTreeStore;
pub use store::{children_of, InMemoryTreeStore, TreeChild, TreeStore, TreeUpdateFn};
pub use uow::{TreeOutput, TreeQuery, TreeUow};
