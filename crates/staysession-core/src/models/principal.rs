use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Account role tags issued by the marketplace backend.
///
/// Tags outside the known set are kept verbatim in `Other`, so they
/// survive a round trip through storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Tourist,
    Owner,
    Partner,
    B2b,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Tourist => "tourist",
            Role::Owner => "owner",
            Role::Partner => "partner",
            Role::B2b => "b2b",
            Role::Other(tag) => tag,
        }
    }
}

impl From<String> for Role {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "tourist" => Role::Tourist,
            "owner" => Role::Owner,
            "partner" => Role::Partner,
            "b2b" => Role::B2b,
            _ => Role::Other(tag),
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a principal. The backend issues both numeric and
/// string ids depending on the account type; anything else is kept as
/// raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrincipalId {
    Number(i64),
    Text(String),
    Other(Value),
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrincipalId::Number(n) => write!(f, "{}", n),
            PrincipalId::Text(s) => write!(f, "{}", s),
            PrincipalId::Other(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for PrincipalId {
    fn from(s: &str) -> Self {
        PrincipalId::Text(s.to_string())
    }
}

impl From<i64> for PrincipalId {
    fn from(n: i64) -> Self {
        PrincipalId::Number(n)
    }
}

/// The authenticated identity held by the session cache.
///
/// Any JSON object is a valid principal. Display attributes the backend
/// sends beyond `id` and `role` are kept verbatim in `attributes`, so a
/// principal survives a JSON round trip through storage unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PrincipalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Principal {
    pub fn new(id: impl Into<PrincipalId>) -> Self {
        Self {
            id: Some(id.into()),
            role: None,
            attributes: Map::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// The id as text, or "unknown" when the backend sent none
    pub fn display_id(&self) -> String {
        self.id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Best human-readable label for the principal
    pub fn display_name(&self) -> String {
        if let Some(name) = self.attribute_str("name").or_else(|| self.attribute_str("full_name")) {
            return name.to_string();
        }
        match (self.attribute_str("first_name"), self.attribute_str("last_name")) {
            (Some(first), Some(last)) => return format!("{} {}", first, last),
            (Some(first), None) => return first.to_string(),
            _ => {}
        }
        self.attribute_str("email")
            .map(|e| e.to_string())
            .unwrap_or_else(|| self.display_id())
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role.as_ref() == Some(&role)
    }

    /// Owners and partners both manage listings
    pub fn is_host(&self) -> bool {
        matches!(self.role, Some(Role::Owner) | Some(Role::Partner))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access_credential: String,
    pub refresh_credential: Option<String>,
}

/// The persisted triple as it sits in one storage backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub principal: Principal,
    pub access_credential: String,
    pub refresh_credential: Option<String>,
}

impl SessionSnapshot {
    pub fn new(
        principal: Principal,
        access_credential: impl Into<String>,
        refresh_credential: Option<String>,
    ) -> Self {
        Self {
            principal,
            access_credential: access_credential.into(),
            refresh_credential,
        }
    }

    pub fn credentials(&self) -> CredentialPair {
        CredentialPair {
            access_credential: self.access_credential.clone(),
            refresh_credential: self.refresh_credential.clone(),
        }
    }
}
