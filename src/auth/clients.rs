use std::fmt;

use anyhow::anyhow;
use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::GetField;

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }

    pub fn scope(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "openid",
            Github => "read:user",
        }
    }

    pub fn userinfo_url(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "https://www.googleapis.com/oauth2/v2/userinfo",
            Github => "https://api.github.com/user",
        }
    }

    /// Stable registered user id for this provider's account id.
    pub fn user_id(&self, account_id: &str) -> String {
        format!("{}:{account_id}", self.id())
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Default)]
pub struct Clients {
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// Builds the provider clients from `{ "google": {...}, "github": {...} }`.
    /// Providers missing from the document stay disabled.
    pub fn from_json(json: Value, public_url: &str) -> anyhow::Result<Clients> {
        let build = |provider: ClientProvider| -> anyhow::Result<Option<HappyClient>> {
            let Some(json) = json.get(provider.slug()) else {
                return Ok(None);
            };
            let client_id = ClientId::new(json.get_str_field("client_id")?);
            let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

            let (auth_url, token_url) = provider.endpoints();
            let auth_url = AuthUrl::new(auth_url.to_owned())?;
            let token_url = TokenUrl::new(token_url.to_owned())?;
            let redirect_url = RedirectUrl::new(format!("{public_url}/lockin/{}", provider.slug()))?;

            Ok(Some(
                BasicClient::new(client_id)
                .set_client_secret(client_secret)
                .set_auth_uri(auth_url)
                .set_token_uri(token_url)
                .set_redirect_uri(redirect_url)
            ))
        };

        Ok(
            Clients {
                google_client: build(ClientProvider::Google)?,
                github_client: build(ClientProvider::Github)?,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> anyhow::Result<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or(anyhow!("OAuth provider {provider} keys not supplied"))
    }
}
