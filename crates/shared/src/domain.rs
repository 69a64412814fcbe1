use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(AccountId);
id_newtype!(ChatId);
id_newtype!(MessageId);

/// An external messaging identity managed through this client.
///
/// `id` is assigned by the backend and never changes. `is_authorized` mirrors
/// the backend's view and only becomes true once the account completed its
/// own multi-step login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Base64-encoded profile photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default)]
    pub is_authorized: bool,
    #[serde(default, deserialize_with = "timestamp::optional")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::optional")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn display_name(&self) -> String {
        match self.first_name.as_deref().filter(|name| !name.is_empty()) {
            Some(first_name) => {
                let mut name = first_name.to_string();
                if let Some(last_name) = self.last_name.as_deref().filter(|n| !n.is_empty()) {
                    name.push(' ');
                    name.push_str(last_name);
                }
                if let Some(username) = self.username.as_deref().filter(|n| !n.is_empty()) {
                    name.push_str(" @");
                    name.push_str(username);
                }
                name
            }
            None => {
                let prefix: String = self.phone_number.chars().take(3).collect();
                format!("Account {prefix}")
            }
        }
    }

    pub fn photo_bytes(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        self.photo
            .as_deref()
            .filter(|photo| !photo.is_empty())
            .map(|photo| STANDARD.decode(photo))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    pub title: String,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub text: String,
    #[serde(deserialize_with = "timestamp::required")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub is_outgoing: bool,
}

/// Identity of the signed-in client user as reported by `GET /users/me`.
///
/// The backend is free to send more than this; unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

/// The backend emits RFC 3339 timestamps or naive ISO-8601 ones without an
/// offset; naive values are taken as UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn optional<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|raw| {
            parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
        })
        .transpose()
    }

    pub fn required<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
