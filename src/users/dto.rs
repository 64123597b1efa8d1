use serde::{Deserialize, Serialize};

use super::repo_types::User;

/// Body of `PUT /users`; `id` is the identity provider's subject id.
#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct UserList {
    pub users: Vec<User>,
}
