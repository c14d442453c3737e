/// Wire types for the Twitch Helix API.
/// Endpoints: /helix/users?login={handle}, /helix/streams?user_login={handle}
use serde::Deserialize;

#[derive(Deserialize, Default, Debug)]
pub struct UsersResponse {
    #[serde(default)]
    pub data: Vec<HelixUser>,
}

#[derive(Deserialize, Default, Debug)]
pub struct HelixUser {
    pub login: String,
    pub display_name: Option<String>,
    pub profile_image_url: Option<String>,
}

#[derive(Deserialize, Default, Debug)]
pub struct StreamsResponse {
    /// Empty when the channel is offline.
    #[serde(default)]
    pub data: Vec<HelixStream>,
}

#[derive(Deserialize, Default, Debug)]
pub struct HelixStream {
    pub user_login: String,
    #[serde(rename = "type", default)]
    pub stream_type: String,
    pub started_at: Option<String>, // RFC 3339
}
