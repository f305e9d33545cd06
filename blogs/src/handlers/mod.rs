pub mod blogs;
pub mod posts;
pub mod user_groups;
