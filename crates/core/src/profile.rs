use crate::error::SearchError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;
use url::Url;

/// Strings accepted as an affirmative membership flag, compared
/// case-insensitively. The set is fixed; do not extend it.
const AFFIRMATIVE_TOKENS: [&str; 4] = ["true", "yes", "1", "是"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub name: Option<String>,
    pub title: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub usage: Option<String>,
}

/// Canonical structured-extraction result for one source document.
///
/// Every schema field is always present after [`OrganizationProfile::normalize`]:
/// scalars default to `None`, collections to empty. The normalizer never
/// invents values the raw extraction output did not contain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProfile {
    pub org_name: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub founded_year: Option<i32>,
    pub size: Option<String>,
    pub industry: Option<String>,
    pub is_member: Option<bool>,
    pub website: Option<String>,
    pub contacts: Vec<Contact>,
    pub members: Vec<Member>,
    pub facilities: Vec<Facility>,
    pub capabilities: Vec<String>,
    pub projects: Vec<String>,
    pub awards: Vec<String>,
    pub services: Vec<String>,
    pub notes: Option<String>,
}

impl OrganizationProfile {
    /// The all-empty canonical profile, substituted when extraction fails.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Coerces whatever the extraction provider returned into the canonical
    /// shape. Pure and total: never fails, never omits a field.
    pub fn normalize(raw: &Value) -> Self {
        let Some(obj) = raw.as_object() else {
            return Self::empty();
        };

        Self {
            org_name: coerce_scalar(obj.get("org_name")),
            country: coerce_scalar(obj.get("country")),
            address: coerce_scalar(obj.get("address")),
            founded_year: coerce_year(obj.get("founded_year")),
            size: coerce_scalar(obj.get("size")),
            industry: coerce_scalar(obj.get("industry")),
            is_member: coerce_flag(obj.get("is_member")),
            website: coerce_scalar(obj.get("website")),
            contacts: coerce_entities(obj.get("contacts"), |item| Contact {
                name: coerce_scalar(item.get("name")),
                email: coerce_scalar(item.get("email")),
                phone: coerce_scalar(item.get("phone")),
                title: coerce_scalar(item.get("title")),
                address: coerce_scalar(item.get("address")),
            }),
            members: coerce_entities(obj.get("members"), |item| Member {
                name: coerce_scalar(item.get("name")),
                title: coerce_scalar(item.get("title")),
                role: coerce_scalar(item.get("role")),
            }),
            facilities: coerce_entities(obj.get("facilities"), |item| Facility {
                name: coerce_scalar(item.get("name")),
                kind: coerce_scalar(item.get("type")),
                usage: coerce_scalar(item.get("usage")),
            }),
            capabilities: coerce_string_list(obj.get("capabilities")),
            projects: coerce_string_list(obj.get("projects")),
            awards: coerce_string_list(obj.get("awards")),
            services: coerce_string_list(obj.get("services")),
            notes: coerce_scalar(obj.get("notes")),
        }
    }

    /// Flattens the profile into the multi-value field layout the index
    /// stores on every chunk of the document.
    pub fn flatten(&self) -> FlatProfile {
        let mut addresses: Vec<String> = Vec::new();
        if let Some(address) = &self.address {
            addresses.push(address.clone());
        }
        addresses.extend(self.contacts.iter().filter_map(|c| c.address.clone()));

        FlatProfile {
            org_name: self.org_name.clone(),
            country: self.country.clone(),
            address: self.address.clone(),
            founded_year: self.founded_year,
            size: self.size.clone(),
            industry: self.industry.clone(),
            is_member: self.is_member,
            website: self.website.clone(),
            members_name: collect(&self.members, |m| m.name.as_ref()),
            members_title: collect(&self.members, |m| m.title.as_ref()),
            members_role: collect(&self.members, |m| m.role.as_ref()),
            facilities_name: collect(&self.facilities, |f| f.name.as_ref()),
            facilities_type: collect(&self.facilities, |f| f.kind.as_ref()),
            facilities_usage: collect(&self.facilities, |f| f.usage.as_ref()),
            capabilities: self.capabilities.clone(),
            projects: self.projects.clone(),
            awards: self.awards.clone(),
            services: self.services.clone(),
            contacts_name: collect(&self.contacts, |c| c.name.as_ref()),
            contacts_email: self
                .contacts
                .iter()
                .filter_map(|c| c.email.as_deref())
                .filter(|email| looks_like_email(email))
                .map(str::to_string)
                .collect(),
            contacts_phone: collect(&self.contacts, |c| c.phone.as_ref()),
            addresses,
            notes: self.notes.clone(),
        }
    }
}

/// Per-chunk copy of the profile, flattened to the index field set.
///
/// Serialized with explicit nulls so a merge-upsert of a re-ingested
/// document clears fields that disappeared from the extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatProfile {
    pub org_name: Option<String>,
    pub country: Option<String>,
    pub address: Option<String>,
    pub founded_year: Option<i32>,
    pub size: Option<String>,
    pub industry: Option<String>,
    pub is_member: Option<bool>,
    pub website: Option<String>,
    pub members_name: Vec<String>,
    pub members_title: Vec<String>,
    pub members_role: Vec<String>,
    pub facilities_name: Vec<String>,
    pub facilities_type: Vec<String>,
    pub facilities_usage: Vec<String>,
    pub capabilities: Vec<String>,
    pub projects: Vec<String>,
    pub awards: Vec<String>,
    pub services: Vec<String>,
    pub contacts_name: Vec<String>,
    pub contacts_email: Vec<String>,
    pub contacts_phone: Vec<String>,
    pub addresses: Vec<String>,
    pub notes: Option<String>,
}

fn collect<T, F>(items: &[T], field: F) -> Vec<String>
where
    F: Fn(&T) -> Option<&String>,
{
    items.iter().filter_map(|item| field(item).cloned()).collect()
}

fn coerce_scalar(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_year(value: Option<&Value>) -> Option<i32> {
    match value {
        Some(Value::Number(n)) => n.as_i64().and_then(|year| i32::try_from(year).ok()),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
                trimmed.parse().ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

fn coerce_flag(value: Option<&Value>) -> Option<bool> {
    match value {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::String(s)) => {
            let lowered = s.trim().to_lowercase();
            Some(AFFIRMATIVE_TOKENS.contains(&lowered.as_str()))
        }
        _ => None,
    }
}

fn coerce_string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            }
        }
        _ => Vec::new(),
    }
}

fn coerce_entities<T, F>(value: Option<&Value>, build: F) -> Vec<T>
where
    F: Fn(&serde_json::Map<String, Value>) -> T,
{
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .map(build)
            .collect(),
        _ => Vec::new(),
    }
}

fn looks_like_email(candidate: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static pattern"))
        .is_match(candidate)
}

/// JSON schema sent with every extraction request.
pub fn profile_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "org_name": {"type": "string"},
            "country": {"type": "string"},
            "address": {"type": "string"},
            "founded_year": {"type": ["integer", "null"]},
            "size": {"type": "string"},
            "industry": {"type": "string"},
            "is_member": {"type": ["boolean", "null"]},
            "website": {"type": ["string", "null"]},
            "contacts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "email": {"type": ["string", "null"]},
                        "phone": {"type": ["string", "null"]},
                        "title": {"type": ["string", "null"]},
                        "address": {"type": ["string", "null"]}
                    }
                }
            },
            "members": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "title": {"type": ["string", "null"]},
                        "role": {"type": ["string", "null"]}
                    }
                }
            },
            "facilities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "type": {"type": ["string", "null"]},
                        "usage": {"type": ["string", "null"]}
                    }
                }
            },
            "capabilities": {"type": "array", "items": {"type": "string"}},
            "projects": {"type": "array", "items": {"type": "string"}},
            "awards": {"type": "array", "items": {"type": "string"}},
            "services": {"type": "array", "items": {"type": "string"}},
            "notes": {"type": "string"}
        }
    })
}

/// Sends document text to a language-model provider and returns the raw
/// structured object. Callers normalize the result and substitute the empty
/// profile on failure; this trait never decides that policy itself.
#[async_trait]
pub trait ProfileExtractor {
    async fn extract_raw(&self, text: &str) -> Result<Value, SearchError>;
}

/// OpenAI-compatible chat-completions client in JSON mode.
pub struct ChatProfileExtractor {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ChatProfileExtractor {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, SearchError> {
        Url::parse(base_url)?;
        Ok(Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn system_prompt() -> String {
        let schema = serde_json::to_string_pretty(&profile_schema()).unwrap_or_default();
        format!(
            "You are a precise information extraction assistant. \
             Given an organization brochure/manual text, extract a comprehensive JSON object \
             that follows the provided JSON schema.\n\n\
             Follow this JSON Schema strictly:\n\n{schema}\n\n\
             Rules:\n\
             - Only extract facts explicitly present\n\
             - Use null for missing scalars; [] for missing arrays\n\
             - Field names must match schema exactly\n\
             - Return valid JSON only"
        )
    }
}

#[async_trait]
impl ProfileExtractor for ChatProfileExtractor {
    async fn extract_raw(&self, text: &str) -> Result<Value, SearchError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": Self::system_prompt()},
                {
                    "role": "user",
                    "content": format!("Extract organization information from this text:\n\n{text}"),
                },
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.1,
            "max_tokens": 2048,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "profile-extractor".to_string(),
                details: response.status().to_string(),
            });
        }

        let payload: Value = response.json().await?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| SearchError::BackendResponse {
                backend: "profile-extractor".to_string(),
                details: "response has no message content".to_string(),
            })?;

        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_of_non_object_is_empty_profile() {
        let profile = OrganizationProfile::normalize(&Value::Null);
        assert_eq!(profile, OrganizationProfile::empty());
        assert!(profile.org_name.is_none());
        assert!(profile.capabilities.is_empty());
        assert!(profile.contacts.is_empty());
    }

    #[test]
    fn year_accepts_integer_or_digit_string() {
        assert_eq!(coerce_year(Some(&json!(1985))), Some(1985));
        assert_eq!(coerce_year(Some(&json!("1985"))), Some(1985));
        assert_eq!(coerce_year(Some(&json!("c. 1985"))), None);
        assert_eq!(coerce_year(Some(&json!(true))), None);
        assert_eq!(coerce_year(None), None);
    }

    #[test]
    fn membership_flag_matches_affirmative_tokens() {
        assert_eq!(coerce_flag(Some(&json!(true))), Some(true));
        assert_eq!(coerce_flag(Some(&json!("YES"))), Some(true));
        assert_eq!(coerce_flag(Some(&json!("是"))), Some(true));
        assert_eq!(coerce_flag(Some(&json!("1"))), Some(true));
        assert_eq!(coerce_flag(Some(&json!("no"))), Some(false));
        assert_eq!(coerce_flag(Some(&json!(3))), None);
        assert_eq!(coerce_flag(None), None);
    }

    #[test]
    fn string_lists_wrap_strings_and_filter_junk() {
        assert_eq!(
            coerce_string_list(Some(&json!("thermal testing"))),
            vec!["thermal testing".to_string()]
        );
        assert_eq!(
            coerce_string_list(Some(&json!(["a", "", Value::Null, 7]))),
            vec!["a".to_string(), "7".to_string()]
        );
        assert!(coerce_string_list(Some(&json!({"not": "a list"}))).is_empty());
        assert!(coerce_string_list(None).is_empty());
    }

    #[test]
    fn scalars_trim_or_default_to_null() {
        assert_eq!(coerce_scalar(Some(&json!("  Acme  "))), Some("Acme".to_string()));
        assert_eq!(coerce_scalar(Some(&json!("   "))), None);
        assert_eq!(coerce_scalar(Some(&json!(12))), Some("12".to_string()));
        assert_eq!(coerce_scalar(Some(&json!(["x"]))), None);
    }

    #[test]
    fn normalize_handles_messy_provider_output() {
        let raw = json!({
            "org_name": " Acme Corp ",
            "founded_year": "1987",
            "is_member": "yes",
            "capabilities": "thermal testing",
            "projects": ["apollo", "", 9],
            "contacts": [
                {"name": "Ada", "email": "a@acme.com"},
                "garbage",
                {"phone": "+49 1234"}
            ],
            "unknown_field": "ignored"
        });

        let profile = OrganizationProfile::normalize(&raw);
        assert_eq!(profile.org_name.as_deref(), Some("Acme Corp"));
        assert_eq!(profile.founded_year, Some(1987));
        assert_eq!(profile.is_member, Some(true));
        assert_eq!(profile.capabilities, vec!["thermal testing".to_string()]);
        assert_eq!(profile.projects, vec!["apollo".to_string(), "9".to_string()]);
        assert_eq!(profile.contacts.len(), 2);
        assert_eq!(profile.contacts[0].email.as_deref(), Some("a@acme.com"));
        assert!(profile.website.is_none());
        assert!(profile.awards.is_empty());
    }

    #[test]
    fn normalize_is_a_fixed_point() {
        let raw = json!({
            "org_name": "Acme",
            "founded_year": 1987,
            "is_member": false,
            "services": ["testing"],
            "members": [{"name": "Grace", "role": "lead"}]
        });

        let once = OrganizationProfile::normalize(&raw);
        let round_tripped = serde_json::to_value(&once).expect("profile serializes");
        let twice = OrganizationProfile::normalize(&round_tripped);
        assert_eq!(once, twice);
    }

    #[test]
    fn flatten_validates_emails_and_aggregates_addresses() {
        let raw = json!({
            "address": "1 Main St",
            "contacts": [
                {"name": "Ada", "email": "a@acme.com", "address": "Lab 2"},
                {"name": "Bob", "email": "not-an-email"}
            ]
        });

        let flat = OrganizationProfile::normalize(&raw).flatten();
        assert_eq!(flat.contacts_name, vec!["Ada".to_string(), "Bob".to_string()]);
        assert_eq!(flat.contacts_email, vec!["a@acme.com".to_string()]);
        assert_eq!(flat.addresses, vec!["1 Main St".to_string(), "Lab 2".to_string()]);
    }

    #[test]
    fn flatten_of_empty_profile_is_all_defaults() {
        let flat = OrganizationProfile::empty().flatten();
        assert!(flat.org_name.is_none());
        assert!(flat.founded_year.is_none());
        assert!(flat.is_member.is_none());
        assert!(flat.members_name.is_empty());
        assert!(flat.contacts_email.is_empty());
        assert!(flat.addresses.is_empty());
    }

    #[test]
    fn flat_profile_serializes_explicit_nulls() {
        let value = serde_json::to_value(OrganizationProfile::empty().flatten())
            .expect("flat profile serializes");
        let obj = value.as_object().expect("object");
        assert!(obj.contains_key("org_name"));
        assert_eq!(obj["org_name"], Value::Null);
        assert_eq!(obj["capabilities"], json!([]));
    }
}
