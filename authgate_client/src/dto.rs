//! Request and response bodies exchanged with the authorization server

use authgate_clock::{DurationSecs, UnixTime};
use authgate_jose::jwt::{ClientId, Realm};
use serde::{Deserialize, Serialize, Serializer};

use crate::{AccessToken, ClientSecret, Password, UserId};

/// Form body of a client credentials token request
#[derive(Debug)]
pub(crate) struct ClientCredentials<'a> {
    pub(crate) client_id: &'a ClientId,
    pub(crate) client_secret: &'a ClientSecret,
}

impl Serialize for ClientCredentials<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut ser = serializer.serialize_struct("ClientCredentials", 3)?;
        ser.serialize_field("grant_type", "client_credentials")?;
        ser.serialize_field("client_id", self.client_id)?;
        ser.serialize_field("client_secret", self.client_secret.as_str())?;
        ser.end()
    }
}

/// A token issued by the token endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: AccessToken,

    /// The token type, normally `Bearer`
    #[serde(default = "bearer")]
    pub token_type: String,

    /// Seconds until the token expires
    pub expires_in: DurationSecs,

    /// Granted scopes, space separated
    #[serde(default)]
    pub scope: Option<String>,
}

fn bearer() -> String {
    "Bearer".into()
}

/// A user to create in the authorization server
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    username: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<Password>,
    enabled: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    roles: Vec<String>,
}

impl UserRegistration {
    /// An enabled user with no password and no roles
    #[must_use]
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            first_name: None,
            last_name: None,
            password: None,
            enabled: true,
            roles: Vec::new(),
        }
    }

    /// Sets the given and family names
    #[must_use]
    pub fn with_name(self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            ..self
        }
    }

    /// Sets an initial password
    #[must_use]
    pub fn with_password(self, password: impl Into<Password>) -> Self {
        Self {
            password: Some(password.into()),
            ..self
        }
    }

    /// Creates the user disabled
    #[must_use]
    pub fn disabled(self) -> Self {
        Self {
            enabled: false,
            ..self
        }
    }

    /// Grants realm roles on creation
    #[must_use]
    pub fn with_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// The requested username
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }
}

/// A user as reported by the authorization server
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The server-assigned identifier
    pub id: UserId,

    /// The login name
    pub username: String,

    /// The email address
    #[serde(default)]
    pub email: Option<String>,

    /// The given name
    #[serde(default)]
    pub first_name: Option<String>,

    /// The family name
    #[serde(default)]
    pub last_name: Option<String>,

    /// Whether the user may sign in
    #[serde(default)]
    pub enabled: bool,

    /// The realm the user belongs to
    #[serde(default)]
    pub realm: Option<Realm>,

    /// Realm roles held by the user
    #[serde(default)]
    pub roles: Vec<String>,

    /// Creation time
    #[serde(default)]
    pub created_at: Option<UnixTime>,
}
