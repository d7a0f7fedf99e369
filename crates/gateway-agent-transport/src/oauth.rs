//! OAuth2 client-credentials token exchange for machine-to-machine gateway access.

use async_trait::async_trait;
use gateway_agent_core::{
    Credential, ProviderName,
    traits::{TokenError, TokenExchange},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchanges client credentials for a short-lived access token.
pub struct ClientCredentialsExchange {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: SecretString,
    scopes: Vec<String>,
}

impl ClientCredentialsExchange {
    #[must_use]
    pub fn new(token_url: Url, client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url,
            client_id: client_id.into(),
            client_secret,
            scopes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_scopes<I>(mut self, scopes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TokenExchange for ClientCredentialsExchange {
    async fn fetch_token(&self, provider: &ProviderName) -> Result<Credential, TokenError> {
        let scope = self.scopes.join(" ");
        let mut form = vec![("grant_type", "client_credentials")];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        let resp = self
            .http
            .post(self.token_url.clone())
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%provider, status = status.as_u16(), "Token endpoint rejected client credentials");
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| TokenError::Request(format!("invalid token response: {e}")))?;

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(TokenError::MissingAccessToken)?;

        tracing::debug!(%provider, "Obtained gateway access token");
        Ok(Credential::new(access_token))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_string_contains, header_exists, method, path},
    };

    use super::*;

    fn exchange(server: &MockServer) -> ClientCredentialsExchange {
        ClientCredentialsExchange::new(
            Url::parse(&format!("{}/oauth2/token", server.uri())).unwrap(),
            "client-1",
            SecretString::from("s3cret".to_string()),
        )
    }

    fn provider() -> ProviderName {
        ProviderName::parse("demo-runtime-gateway-auth").unwrap()
    }

    #[tokio::test]
    async fn test_client_credentials_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("scope=gateway%2Finvoke"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok-1", "token_type": "Bearer", "expires_in": 3600
            })))
            .expect(2)
            .mount(&server)
            .await;

        let exchange = exchange(&server).with_scopes(["gateway/invoke"]);
        let first = exchange.fetch_token(&provider()).await.unwrap();
        let second = exchange.fetch_token(&provider()).await.unwrap();
        assert_eq!(first.expose(), "tok-1");
        assert_eq!(second.expose(), "tok-1");
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
            .mount(&server)
            .await;

        let err = exchange(&server).fetch_token(&provider()).await.unwrap_err();
        assert!(matches!(err, TokenError::Rejected { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_missing_access_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer"})))
            .mount(&server)
            .await;

        let err = exchange(&server).fetch_token(&provider()).await.unwrap_err();
        assert!(matches!(err, TokenError::MissingAccessToken));
    }
}
