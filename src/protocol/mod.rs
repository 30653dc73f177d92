//! Request/response contract between the surfaces and the store.

mod client;
mod command;
mod coordinator;
mod response;

pub use client::StoreClient;
pub use command::{
    CategoryRef, CategoryUpdate, Command, NewCategory, PostRef, SavePost, UpdatePost,
};
pub use coordinator::{Coordinator, Request};
pub use response::{Outcome, Response};
