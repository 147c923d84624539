pub mod buffer;
pub mod disk;
pub mod heap;
pub mod page;
pub mod store;

pub use store::PageStore;
