use anyhow::{bail, Result};
use buddy_common::ApiError;
use reqwest::Response;

pub mod client {
    use reqwest::Client;
    use buddy_common::{AttributeLists, AttributeUpdate, FriendRequest, ImportReport, LoginRequest, LoginResponse, MatchResult, QuizSubmission, RankRequest, RawUserRecord, RegisterRequest, Url, UserSummary};
    use anyhow::Result;
    use crate::checked;

    pub async fn register(client: &Client, server: &Url, request: &RegisterRequest) -> Result<UserSummary> {
        Ok(checked(client.post(server.join("/register"))
            .json(request)
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn login(client: &Client, server: &Url, username: &str, password: &str) -> Result<LoginResponse> {
        Ok(checked(client.post(server.join("/login"))
            .json(&LoginRequest { username: username.to_string(), password: password.to_string() })
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn get_user(client: &Client, server: &Url, username: &str) -> Result<UserSummary> {
        Ok(checked(client.get(server.join("/users/") + username)
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn update_attributes(client: &Client, server: &Url, token: &str, username: &str, attributes: AttributeLists) -> Result<UserSummary> {
        Ok(checked(client.post(server.join("/attributes"))
            .bearer_auth(token)
            .json(&AttributeUpdate { username: username.to_string(), attributes })
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn add_friend(client: &Client, server: &Url, token: &str, username: &str, friend_username: &str) -> Result<()> {
        checked(client.post(server.join("/friends"))
            .bearer_auth(token)
            .json(&FriendRequest { username: username.to_string(), friend_username: friend_username.to_string() })
            .send()
            .await?)
            .await?;
        Ok(())
    }
    pub async fn get_friends(client: &Client, server: &Url, username: &str) -> Result<Vec<UserSummary>> {
        Ok(checked(client.get(server.join("/users/") + username + "/friends")
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn rank(client: &Client, server: &Url, token: &str, request: &RankRequest) -> Result<MatchResult> {
        Ok(checked(client.post(server.join("/rank"))
            .bearer_auth(token)
            .json(request)
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn import_batch(client: &Client, server: &Url, records: &[RawUserRecord]) -> Result<ImportReport> {
        Ok(checked(client.post(server.join("/import"))
            .json(records)
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn load_feed(client: &Client, server: &Url) -> Result<ImportReport> {
        Ok(checked(client.post(server.join("/load_json"))
            .send()
            .await?)
            .await?
            .json::<_>()
            .await?)
    }
    pub async fn submit_quiz(client: &Client, server: &Url, token: &str, username: &str, responses: serde_json::Value) -> Result<()> {
        checked(client.post(server.join("/quiz"))
            .bearer_auth(token)
            .json(&QuizSubmission { username: username.to_string(), responses })
            .send()
            .await?)
            .await?;
        Ok(())
    }
}

/// Turns a non-success response into an error carrying the server's code.
async fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match response.json::<ApiError>().await {
        Ok(error) => bail!("{status} {}: {}", error.code, error.message),
        Err(_) => bail!("{status}"),
    }
}
