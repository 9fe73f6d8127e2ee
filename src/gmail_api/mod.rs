//! Gmail API module split into logical submodules
//!
//! - auth: token lifecycle (consent, silent refresh, validity probe, revocation)
//! - client: HTTP plumbing shared by the other submodules
//! - messages: search and message retrieval

pub mod auth;
pub mod client;
pub mod messages;

pub use auth::{FlowError, InstalledFlow, OAuthFlow, Prompt, TokenManager, TokenState};
pub use client::GmailClient;
pub use messages::{get_message, search, search_with_reauth, RetryPolicy, SearchOutcome};

#[cfg(test)]
pub(crate) mod test_support {
    use super::GmailClient;
    use crate::bootstrap::ProviderEndpoints;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn client_for(server: &MockServer) -> GmailClient {
        GmailClient::new(
            reqwest::Client::new(),
            ProviderEndpoints {
                api_base: format!("{}/gmail/v1", server.uri()),
                revoke_url: format!("{}/revoke", server.uri()),
                token_info_url: format!("{}/oauth2/v1/tokeninfo", server.uri()),
                api_key: None,
            },
        )
    }

    pub async fn mount_token_info(server: &MockServer, token: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path("/oauth2/v1/tokeninfo"))
            .and(query_param("access_token", token))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "scope": "https://www.googleapis.com/auth/gmail.readonly",
                "expires_in": 3599
            })))
            .mount(server)
            .await;
    }

    pub async fn mount_revoke(server: &MockServer, status: u16) {
        Mock::given(method("POST"))
            .and(path("/revoke"))
            .respond_with(ResponseTemplate::new(status))
            .mount(server)
            .await;
    }

    pub async fn mount_search(server: &MockServer, token: &str, query: &str, ids: &[&str]) {
        let messages: Vec<_> = ids
            .iter()
            .map(|id| json!({ "id": id, "threadId": format!("t-{id}") }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/gmail/v1/users/me/messages"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .and(query_param("q", query))
            .and(query_param("maxResults", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": messages,
                "resultSizeEstimate": ids.len()
            })))
            .mount(server)
            .await;
    }

    pub async fn mount_message(server: &MockServer, token: &str, id: &str, subject: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/gmail/v1/users/me/messages/{id}")))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .and(query_param("format", "full"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "threadId": format!("t-{id}"),
                "snippet": "preview",
                "payload": {
                    "partId": "",
                    "mimeType": "text/plain",
                    "headers": [{ "name": "Subject", "value": subject }],
                    "body": { "size": 5, "data": "aGVsbG8" }
                }
            })))
            .mount(server)
            .await;
    }
}
