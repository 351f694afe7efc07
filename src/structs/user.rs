use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::{errors::ClientError, errors::Result, ApiRequest, Client};

/// User row as the admin screens see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAdmin {
    pub id: String,
    pub user_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// First school year the user is billed for.
    #[serde(default)]
    pub start_school_year: Option<i32>,
    #[serde(default)]
    pub is_eligible: Option<bool>,
}

/// Partial update; unset fields are left alone by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_school_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEligibility {
    pub user_id: String,
    pub is_eligible: bool,
    #[serde(default)]
    pub start_school_year: Option<i32>,
    #[serde(default)]
    pub current_school_year: Option<i32>,
    #[serde(default)]
    pub eligibility_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYear {
    pub year: i32,
    /// ISO date the school year starts.
    pub start_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub time: String,
    pub professor_name: String,
    #[serde(default)]
    pub professor_email: Option<String>,
    #[serde(default)]
    pub student_name: Option<String>,
    #[serde(default)]
    pub student_email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Client {
    /// All non-admin users.
    pub async fn all_users(&self) -> Result<Vec<UserAdmin>> {
        self.get_json("/auth/users").await
    }

    /// Users with eligibility info, for the admin dashboard.
    pub async fn admin_users(&self) -> Result<Vec<UserAdmin>> {
        self.get_json("/admin/users").await
    }

    pub async fn update_user(&self, id: &str, update: &UpdateUser) -> Result<()> {
        let path = format!("/admin/users/{}", encode_segment(id)?);
        self.call(ApiRequest::put(path).json(update)?).await
    }

    pub async fn user_eligibility(&self, user_id: &str) -> Result<UserEligibility> {
        let path = format!("/admin/users/{}/eligibility", encode_segment(user_id)?);
        self.get_json(&path).await
    }

    pub async fn school_years(&self) -> Result<Vec<SchoolYear>> {
        self.get_json("/admin/schoolyears").await
    }

    /// Add or replace a school year.
    pub async fn set_school_year(&self, year: &SchoolYear) -> Result<()> {
        self.call(ApiRequest::post("/admin/schoolyears").json(year)?)
            .await
    }

    /// `None` when the backend has no current school year (404).
    pub async fn current_school_year(&self) -> Result<Option<SchoolYear>> {
        match self.get_json("/admin/schoolyears/current").await {
            Ok(year) => Ok(Some(year)),
            Err(ClientError::Api { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Appointments, optionally bounded by ISO dates.
    pub async fn appointments(
        &self,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<Vec<Appointment>> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(start) = start_date {
            query.append_pair("startDate", start);
        }
        if let Some(end) = end_date {
            query.append_pair("endDate", end);
        }
        let query = query.finish();

        let path = if query.is_empty() {
            "/admin/appointments".to_string()
        } else {
            format!("/admin/appointments?{}", query)
        };

        self.get_json(&path).await
    }
}

/// Percent-encode a single path segment. Ids are opaque strings from the
/// backend, so a stray `/` must not change the route.
pub(crate) fn encode_segment(segment: &str) -> Result<String> {
    if segment.trim().is_empty() {
        return Err(ClientError::InvalidRequest("empty id".to_string()));
    }
    Ok(form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20"))
}
