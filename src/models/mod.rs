mod category;
mod post;

pub use category::{
    default_categories, is_valid_color, slugify, Category, CategoryId, RESERVED_CATEGORY_ID,
};
pub use post::{
    category_id_list, timestamp_now, CategorizedPost, CategoryMembership, PostId, PostMap, PostSnapshot,
};
