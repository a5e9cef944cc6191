//! # User profiles
//!
//! The [`User`] record extracted from free text, the JSON schemas handed to
//! the model for extraction and relevancy grading, and the [`UserService`]
//! that saves profiles into the vector store and runs the per-hit LLM calls
//! of a search.
//!
//! Profiles serialise in camelCase (`previousCompanies`, `createdAt`, ...),
//! the shape the extraction schema asks the model for.

mod service;

pub use service::{NO_RESULTS_ANSWER, UserService, user_to_document, user_to_searchable_text};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use std::{fmt, str::FromStr};

/// A person's profile. Every field is optional because extraction is
/// best-effort; [`UserService::save_user`] decides what is complete enough.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    /// Raw text the profile was extracted from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Source-system id. Models tend to answer with a number, so both
    /// numbers and strings are accepted.
    #[serde(deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub location: Option<String>,
    pub skills: Option<Vec<String>>,
    pub previous_companies: Option<Vec<String>>,
    pub interests: Option<Vec<String>>,
    pub experience: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl User {
    /// Display name, `"Unknown"` when absent.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Missing, blank, or the literal string `"null"` some models emit.
pub(crate) fn is_invalid_field(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(s) => {
            let s = s.trim();
            s.is_empty() || s == "null"
        }
    }
}

/// The model's verdict on how well a profile answers a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRelevancy {
    High,
    Mid,
    Low,
}

impl UserRelevancy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRelevancy::High => "HIGH",
            UserRelevancy::Mid => "MID",
            UserRelevancy::Low => "LOW",
        }
    }

    /// HIGH and MID hits are shown; LOW ones are dropped.
    pub fn is_relevant(&self) -> bool {
        matches!(self, UserRelevancy::High | UserRelevancy::Mid)
    }
}

impl fmt::Display for UserRelevancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRelevancy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(UserRelevancy::High),
            "MID" | "MEDIUM" => Ok(UserRelevancy::Mid),
            "LOW" => Ok(UserRelevancy::Low),
            other => Err(format!("unknown relevancy: {other}")),
        }
    }
}

fn nullable_string(description: &str) -> Value {
    json!({ "type": ["string", "null"], "description": description })
}

fn nullable_list(description: &str) -> Value {
    json!({
        "type": ["array", "null"],
        "items": { "type": "string" },
        "description": description
    })
}

/// Schema for profile extraction. Every field is required but nullable.
/// Timestamps are not asked for; saving assigns them.
pub static USER_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": ["number", "null"] },
            "name": nullable_string("The person's full name"),
            "email": nullable_string("The person's email address"),
            "role": nullable_string("Their job title or professional role"),
            "location": nullable_string("City, country, or region where they're based"),
            "skills": nullable_list("Technical skills, programming languages, tools they know"),
            "previousCompanies": nullable_list("Companies they previously worked at"),
            "interests": nullable_list("Personal interests, hobbies, or professional preferences"),
            "experience": nullable_string("Summary of their professional experience")
        },
        "required": [
            "id", "name", "email", "role", "location", "skills",
            "previousCompanies", "interests", "experience"
        ],
        "additionalProperties": false
    })
});

pub static RELEVANCY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "relevancy": { "type": "string", "enum": ["HIGH", "MID", "LOW"] }
        },
        "required": ["relevancy"],
        "additionalProperties": false
    })
});
