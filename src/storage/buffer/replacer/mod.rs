mod lru;

pub(crate) use lru::LruPageTable;
