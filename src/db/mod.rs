mod schema;
mod storage;

pub use storage::{
    Quota, Storage, StorageChange, StorageRecord, CATEGORIES_KEY, CATEGORIZED_POSTS_KEY,
    SIDE_PANEL_KEY,
};
