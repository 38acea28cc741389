//! `OAuth2` provider endpoints.

use reqwest::Url;

use crate::error::{Error, Result};

/// Token endpoint and scopes of one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    /// Provider name (e.g., "Google").
    pub name: String,
    /// Token endpoint URL.
    pub token_url: Url,
    /// Scopes requested on refresh.
    pub scopes: Vec<String>,
}

impl Provider {
    /// Creates a provider from its token endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(name: impl Into<String>, token_url: impl AsRef<str>) -> Result<Self> {
        let token_url = Url::parse(token_url.as_ref())
            .map_err(|e| Error::InvalidConfig(format!("token URL: {e}")))?;
        Ok(Self {
            name: name.into(),
            token_url,
            scopes: Vec::new(),
        })
    }

    /// Sets the scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Google, full Gmail access over IMAP.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn google() -> Result<Self> {
        Ok(Self::new("Google", "https://oauth2.googleapis.com/token")?
            .with_scopes(["https://mail.google.com/"]))
    }

    /// Microsoft / Office 365 IMAP.
    ///
    /// # Errors
    ///
    /// Returns an error if URL parsing fails.
    pub fn microsoft() -> Result<Self> {
        Ok(Self::new(
            "Microsoft",
            "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        )?
        .with_scopes([
            "offline_access",
            "https://outlook.office365.com/IMAP.AccessAsUser.All",
        ]))
    }

    /// Space-separated scope string, or `None` when no scopes are set.
    #[must_use]
    pub fn scope_param(&self) -> Option<String> {
        (!self.scopes.is_empty()).then(|| self.scopes.join(" "))
    }
}
