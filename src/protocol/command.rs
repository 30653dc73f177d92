use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{category_id_list, CategoryId, PostId, PostSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRef {
    pub post_id: PostId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePost {
    pub post_id: PostId,
    #[serde(default)]
    pub post_data: PostSnapshot,
    #[serde(default, deserialize_with = "category_id_list")]
    pub category_ids: Vec<CategoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePost {
    pub post_id: PostId,
    #[serde(default, deserialize_with = "category_id_list")]
    pub category_ids: Vec<CategoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub category_id: CategoryId,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRef {
    pub category_id: CategoryId,
}

/// A request against the store. On the wire this is
/// `{"action": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum Command {
    GetCategories,
    GetCategorizedPosts,
    GetPostCategory(PostRef),
    SavePostCategory(SavePost),
    RemovePostCategory(PostRef),
    UpdatePostCategories(UpdatePost),
    AddCategory(NewCategory),
    UpdateCategory(CategoryUpdate),
    RemoveCategory(CategoryRef),
    ResetAllData,
}

impl Command {
    pub const ACTIONS: [&'static str; 10] = [
        "getCategories",
        "getCategorizedPosts",
        "getPostCategory",
        "savePostCategory",
        "removePostCategory",
        "updatePostCategories",
        "addCategory",
        "updateCategory",
        "removeCategory",
        "resetAllData",
    ];

    pub fn action(&self) -> &'static str {
        match self {
            Command::GetCategories => "getCategories",
            Command::GetCategorizedPosts => "getCategorizedPosts",
            Command::GetPostCategory(_) => "getPostCategory",
            Command::SavePostCategory(_) => "savePostCategory",
            Command::RemovePostCategory(_) => "removePostCategory",
            Command::UpdatePostCategories(_) => "updatePostCategories",
            Command::AddCategory(_) => "addCategory",
            Command::UpdateCategory(_) => "updateCategory",
            Command::RemoveCategory(_) => "removeCategory",
            Command::ResetAllData => "resetAllData",
        }
    }

    /// Parse a raw `{action, data}` message. Payload-less actions ignore
    /// whatever `data` holds.
    pub fn from_message(message: Value) -> Result<Self> {
        let action = message
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::InvalidPayload("missing action".to_string()))?;
        let data = message.get("data").cloned().unwrap_or(Value::Null);

        let command = match action {
            "getCategories" => Command::GetCategories,
            "getCategorizedPosts" => Command::GetCategorizedPosts,
            "getPostCategory" => Command::GetPostCategory(payload(data)?),
            "savePostCategory" => Command::SavePostCategory(payload(data)?),
            "removePostCategory" => Command::RemovePostCategory(payload(data)?),
            "updatePostCategories" => Command::UpdatePostCategories(payload(data)?),
            "addCategory" => Command::AddCategory(payload(data)?),
            "updateCategory" => Command::UpdateCategory(payload(data)?),
            "removeCategory" => Command::RemoveCategory(payload(data)?),
            "resetAllData" => Command::ResetAllData,
            other => return Err(AppError::UnknownAction(other.to_string())),
        };
        Ok(command)
    }

    pub fn to_message(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn payload<T: DeserializeOwned>(data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| AppError::InvalidPayload(e.to_string()))
}
