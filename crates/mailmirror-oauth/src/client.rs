//! Refresh-token exchange.

use chrono::Utc;
use reqwest::Client;
use tracing::debug;

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// `OAuth2` client registration at one provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Exchanges a refresh token for a fresh access token.
    ///
    /// The returned token keeps `refresh_token` when the provider did not
    /// rotate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the endpoint rejects the grant.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Token> {
        let scope = self.provider.scope_param();
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(secret) = &self.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        if let Some(scope) = &scope {
            params.push(("scope", scope.as_str()));
        }

        debug!(provider = %self.provider.name, "refreshing access token");
        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(match serde_json::from_slice::<ErrorResponse>(&body) {
                Ok(error) => error.into_error(),
                Err(_) => Error::InvalidResponse(format!("HTTP {status}")),
            });
        }

        let token_response: TokenResponse = serde_json::from_slice(&body)?;
        if token_response.access_token.is_empty() {
            return Err(Error::InvalidResponse("empty access token".to_string()));
        }
        let mut token = Token::from_response(token_response, Utc::now());
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Serves one canned HTTP response and returns the request it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (Provider, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            l.to_ascii_lowercase()
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8(request).unwrap()
        });
        let provider = Provider::new("Local", format!("http://{addr}/token")).unwrap();
        (provider, handle)
    }

    #[tokio::test]
    async fn refresh_posts_grant_and_keeps_refresh_token() {
        let (provider, server) =
            serve_once("200 OK", r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3600}"#).await;
        let client = OAuthClient::new("cid", provider).with_client_secret("secret");

        let token = client.refresh_token("r1").await.unwrap();
        assert_eq!(token.access_token, "fresh");
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
        assert!(!token.is_expired());

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /token"));
        assert!(request.contains("grant_type=refresh_token"));
        assert!(request.contains("refresh_token=r1"));
        assert!(request.contains("client_secret=secret"));
    }

    #[tokio::test]
    async fn rejected_grant_is_oauth_error() {
        let (provider, server) = serve_once(
            "400 Bad Request",
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        )
        .await;
        let client = OAuthClient::new("cid", provider);

        let err = client.refresh_token("stale").await.unwrap_err();
        assert!(err.is_grant_rejected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn non_json_failure_reports_status() {
        let (provider, server) = serve_once("503 Service Unavailable", "down").await;
        let client = OAuthClient::new("cid", provider);

        let err = client.refresh_token("r").await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(msg) if msg.contains("503")));
        server.await.unwrap();
    }
}
