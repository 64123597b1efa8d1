use serde::{Deserialize, Serialize};

/// Body of `POST /oauth/google`.
#[derive(Debug, Deserialize)]
pub struct GoogleOauthRequest {
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OauthResponse {
    pub user_id: i64,
    pub token: String,
}
