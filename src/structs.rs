use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod announcement;
pub mod client;
pub mod notice;
pub mod session;
pub mod user;

/// Access/refresh pair issued by login and refresh.
///
/// The backend is inconsistent about casing, so both `accessToken` and
/// `AccessToken` are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    #[serde(alias = "AccessToken")]
    pub access_token: String,
    #[serde(alias = "RefreshToken")]
    pub refresh_token: String,
    #[serde(default, alias = "Role", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Lifecycle status of a payment notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeStatus {
    Pending,
    /// Also reported as `SUCCEEDED` by some endpoints.
    Paid,
    Failed,
    Expired,
}

impl NoticeStatus {
    /// Numeric code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Paid => 1,
            Self::Failed => 2,
            Self::Expired => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Pending),
            1 => Some(Self::Paid),
            2 => Some(Self::Failed),
            3 => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(Self::Pending),
            "PAID" | "SUCCEEDED" => Some(Self::Paid),
            "FAILED" => Some(Self::Failed),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Wire name used by the status-filtered listing.
    pub fn query_name(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    /// No further transition is expected from this status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Failed => "Failed",
            Self::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for NoticeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Display label for a raw status code, `"Unknown"` for anything unmapped.
pub fn display_label(code: i64) -> &'static str {
    NoticeStatus::from_code(code)
        .map(NoticeStatus::label)
        .unwrap_or("Unknown")
}

impl Serialize for NoticeStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for NoticeStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Code(i64),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Code(code) => NoticeStatus::from_code(code).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown notice status code {}", code))
            }),
            Raw::Name(name) => NoticeStatus::from_name(&name).ok_or_else(|| {
                serde::de::Error::custom(format!("unknown notice status {:?}", name))
            }),
        }
    }
}

/// A payment request raised against a user. Owned by the backend; the client
/// only holds snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotice {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: NoticeStatus,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "timestamp::option")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Wallet checkout page for this notice.
    #[serde(default, rename = "xenditPaymentLinkUrl", alias = "paymentUrl")]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Breadcrumb left in storage while the user is away on the checkout page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub notice_id: String,
    pub method: String,
    /// Milliseconds since the epoch, as a string.
    pub timestamp: String,
}

impl PendingPayment {
    pub fn new(notice_id: &str, method: &str) -> Self {
        Self {
            notice_id: notice_id.to_string(),
            method: method.to_string(),
            timestamp: Utc::now().timestamp_millis().to_string(),
        }
    }
}

/// Timestamps come either as RFC 3339 or as a naive ISO string that is
/// implicitly UTC.
pub(crate) mod timestamp {
    use super::*;

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {:?}", raw)))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&value.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => parse(&raw).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp {:?}", raw))
                }),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(json!(0), NoticeStatus::Pending)]
    #[case(json!(1), NoticeStatus::Paid)]
    #[case(json!(3), NoticeStatus::Expired)]
    #[case(json!("SUCCEEDED"), NoticeStatus::Paid)]
    #[case(json!("paid"), NoticeStatus::Paid)]
    #[case(json!("Failed"), NoticeStatus::Failed)]
    fn status_accepts_codes_and_names(
        #[case] raw: serde_json::Value,
        #[case] expected: NoticeStatus,
    ) {
        let status: NoticeStatus = serde_json::from_value(raw).unwrap();
        assert_eq!(status, expected);
    }

    #[rstest]
    #[case(json!(7))]
    #[case(json!("REFUNDED"))]
    #[case(json!(null))]
    fn status_rejects_unknown_values(#[case] raw: serde_json::Value) {
        assert!(serde_json::from_value::<NoticeStatus>(raw).is_err());
    }

    #[test]
    fn display_label_falls_back_to_unknown() {
        assert_eq!(display_label(1), "Paid");
        assert_eq!(display_label(42), "Unknown");
    }

    #[test]
    fn token_pair_accepts_pascal_case() {
        let pair: TokenPair = serde_json::from_value(json!({
            "AccessToken": "a1",
            "RefreshToken": "r1",
            "Role": "Admin"
        }))
        .unwrap();
        assert_eq!(pair.access_token, "a1");
        assert_eq!(pair.refresh_token, "r1");
        assert_eq!(pair.role.as_deref(), Some("Admin"));
    }

    #[test]
    fn notice_decodes_backend_shape() {
        let notice: PaymentNotice = serde_json::from_value(json!({
            "id": "n1",
            "title": "Org dues",
            "amount": 150.5,
            "currency": "PHP",
            "status": 0,
            "createdAt": "2024-06-01T08:30:00",
            "paidAt": null,
            "xenditPaymentLinkUrl": "https://checkout.example/abc",
            "userId": "u1"
        }))
        .unwrap();

        assert_eq!(notice.status, NoticeStatus::Pending);
        assert_eq!(notice.amount, Decimal::new(1505, 1));
        assert_eq!(notice.checkout_url.as_deref(), Some("https://checkout.example/abc"));
        assert!(notice.paid_at.is_none());
        assert_eq!(notice.created_at.to_rfc3339(), "2024-06-01T08:30:00+00:00");
    }
}
