use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::user::encode_segment;
use super::{NoticeStatus, PaymentNotice};
use crate::errors::{ClientError, Result};
use crate::poller::StatusSource;
use crate::Client;

/// Admin payload for raising a notice against a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotice {
    pub user_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
}

impl CreateNotice {
    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(ClientError::InvalidRequest("userId is required".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(ClientError::InvalidRequest("title is required".to_string()));
        }
        if self.amount <= Decimal::ZERO {
            return Err(ClientError::InvalidRequest(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.currency.trim().is_empty() {
            return Err(ClientError::InvalidRequest("currency is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: NoticeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
}

/// Where to send the user to pay a notice.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentLink {
    pub notice: Option<PaymentNotice>,
    pub payment_url: String,
}

impl PaymentLink {
    /// Accepts `paymentUrl` or `xenditPaymentLinkUrl`, at the top level or on
    /// the embedded notice.
    fn from_value(value: Value) -> Result<Self> {
        let notice = match value.get("notice") {
            Some(raw) if !raw.is_null() => {
                Some(serde_json::from_value::<PaymentNotice>(raw.clone())?)
            }
            _ => None,
        };

        let payment_url = ["paymentUrl", "xenditPaymentLinkUrl"]
            .iter()
            .find_map(|field| value.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .or_else(|| notice.as_ref().and_then(|n| n.checkout_url.clone()))
            .ok_or_else(|| {
                ClientError::MalformedResponse("payment link response has no URL".to_string())
            })?;

        Ok(Self {
            notice,
            payment_url,
        })
    }
}

impl Client {
    /// Notices raised against the logged-in user.
    pub async fn my_payment_requests(&self) -> Result<Vec<PaymentNotice>> {
        self.get_json("/payment-notices/my-requests").await
    }

    /// Current snapshot of one notice.
    pub async fn payment_notice(&self, id: &str) -> Result<PaymentNotice> {
        let path = format!("/payment-notices/{}", encode_segment(id)?);
        self.get_json(&path).await
    }

    /// Admin listing filtered by status.
    pub async fn payments_by_status(&self, status: NoticeStatus) -> Result<Vec<PaymentNotice>> {
        let path = format!("/payment-notices?status={}", status.query_name());
        self.get_json(&path).await
    }

    pub async fn payment_link(&self, id: &str) -> Result<PaymentLink> {
        let path = format!("/payment-notices/{}/pay", encode_segment(id)?);
        let value: Value = self.get_json(&path).await?;
        PaymentLink::from_value(value)
    }

    pub async fn create_payment_notice(&self, notice: &CreateNotice) -> Result<PaymentNotice> {
        notice.validate()?;
        self.post_json("/payment-notices", notice).await
    }

    /// Set a notice's status. Returns the status the backend recorded.
    pub async fn update_payment_status(
        &self,
        id: &str,
        update: &StatusUpdate,
    ) -> Result<NoticeStatus> {
        #[derive(Deserialize)]
        struct Updated {
            status: NoticeStatus,
        }

        let path = format!("/updatepayment/{}", encode_segment(id)?);
        let updated: Updated = self.patch_json(&path, update).await?;
        Ok(updated.status)
    }

    /// Mark a notice paid as of `paid_at`.
    pub async fn mark_paid(&self, id: &str, paid_at: DateTime<Utc>) -> Result<NoticeStatus> {
        self.update_payment_status(
            id,
            &StatusUpdate {
                status: NoticeStatus::Paid,
                paid_at: Some(paid_at.to_rfc3339()),
            },
        )
        .await
    }
}

#[async_trait]
impl StatusSource for Client {
    async fn notice_status(&self, notice_id: &str) -> Result<NoticeStatus> {
        Ok(self.payment_notice(notice_id).await?.status)
    }
}
