use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::timestamp;
use crate::errors::{ClientError, Result};
use crate::{ApiRequest, Client};

/// A notice board post shown to every user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(
        default,
        alias = "createdAt",
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl Announcement {
    /// First `max_chars` characters of the content, with an ellipsis when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head.trim_end())
        } else {
            head
        }
    }
}

/// Admin payload for posting an announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnnouncement {
    pub title: String,
    pub content: String,
}

impl NewAnnouncement {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() || self.content.trim().is_empty() {
            return Err(ClientError::InvalidRequest(
                "announcement needs both a title and content".to_string(),
            ));
        }
        Ok(())
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(id) => id,
        Raw::Number(id) => id.to_string(),
    })
}

impl Client {
    /// Every announcement, as the backend orders them.
    pub async fn announcements(&self) -> Result<Vec<Announcement>> {
        self.get_json("/announcements").await
    }

    /// Post an announcement. The response body is not used.
    pub async fn create_announcement(&self, announcement: &NewAnnouncement) -> Result<()> {
        announcement.validate()?;
        self.call(ApiRequest::post("/announcement").json(announcement)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn announcement_accepts_numeric_id_and_snake_case_timestamp() {
        let announcement: Announcement = serde_json::from_value(json!({
            "id": 7,
            "title": "Assembly",
            "content": "General assembly on Friday.",
            "created_at": "2024-06-01T08:30:00"
        }))
        .unwrap();

        assert_eq!(announcement.id, "7");
        assert_eq!(
            announcement.created_at.map(|at| at.to_rfc3339()).as_deref(),
            Some("2024-06-01T08:30:00+00:00")
        );
    }

    #[test]
    fn announcement_without_timestamp_decodes() {
        let announcement: Announcement = serde_json::from_value(json!({
            "id": "a1",
            "title": "Hi",
            "content": "Welcome"
        }))
        .unwrap();
        assert_eq!(announcement.created_at, None);
    }

    #[test]
    fn preview_cuts_long_content() {
        let announcement = Announcement {
            id: "a1".to_string(),
            title: "Dues".to_string(),
            content: "Pay your dues before the end of the month".to_string(),
            created_at: None,
        };
        assert_eq!(announcement.preview(12), "Pay your due...");
        assert_eq!(announcement.preview(100), announcement.content);
    }

    #[test]
    fn new_announcement_needs_title_and_content() {
        assert!(NewAnnouncement::new("Dues", "Due Friday").validate().is_ok());
        assert!(NewAnnouncement::new("", "Due Friday").validate().is_err());
        assert!(NewAnnouncement::new("Dues", "  ").validate().is_err());
    }
}
