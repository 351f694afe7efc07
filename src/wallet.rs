//! Wallet checkout: send the user to the e-wallet page and watch the notice
//! until the backend says how it went.

use std::sync::Arc;

use url::Url;

use crate::errors::{ClientError, Result};
use crate::poller::{OnSettled, PaymentPoller, PollHandle, PollPolicy, PollState};
use crate::structs::PendingPayment;
use crate::Client;

/// Supported e-wallets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletMethod {
    GCash,
    PayMaya,
}

impl WalletMethod {
    pub fn id(self) -> &'static str {
        match self {
            Self::GCash => "gcash",
            Self::PayMaya => "paymaya",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GCash => "GCash",
            Self::PayMaya => "PayMaya",
        }
    }

    /// Channel code the checkout page expects.
    pub fn channel_code(self) -> &'static str {
        match self {
            Self::GCash => "PH_GCASH",
            Self::PayMaya => "PH_MAYA",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_ascii_lowercase().as_str() {
            "gcash" => Some(Self::GCash),
            "paymaya" | "maya" => Some(Self::PayMaya),
            _ => None,
        }
    }
}

impl std::fmt::Display for WalletMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The notice's checkout URL with the wallet channel selected.
pub fn checkout_url(payment_url: &str, method: WalletMethod) -> Result<String> {
    let mut url = Url::parse(payment_url).map_err(|e| {
        ClientError::InvalidRequest(format!("bad payment URL {}: {}", payment_url, e))
    })?;
    url.query_pairs_mut()
        .append_pair("channel", method.channel_code());
    Ok(url.into())
}

/// Presents a URL to the user. Fire-and-forget: returning `Ok` only means the
/// page was handed off, not that anything happened there.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, url: &str) -> Result<()>;
}

/// Opens the system default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> Result<()> {
        open::that(url).map_err(|e| ClientError::BrowserLaunch(e.to_string()))
    }
}

/// Drives one wallet payment from redirect to a settled status.
pub struct WalletCheckout {
    client: Client,
    launcher: Arc<dyn BrowserLauncher>,
    poller: PaymentPoller,
}

impl WalletCheckout {
    pub fn new(client: Client) -> Self {
        Self::with_parts(client, Arc::new(SystemBrowser), PollPolicy::default())
    }

    pub fn with_parts(
        client: Client,
        launcher: Arc<dyn BrowserLauncher>,
        policy: PollPolicy,
    ) -> Self {
        let poller = PaymentPoller::new(Arc::new(client.clone()), policy);
        Self {
            client,
            launcher,
            poller,
        }
    }

    /// Fetch the notice's payment link, then [`start`](Self::start).
    pub async fn pay(&self, notice_id: &str, method: WalletMethod) -> Result<PollHandle> {
        let link = self.client.payment_link(notice_id).await?;
        self.start(notice_id, &link.payment_url, method)
    }

    /// Leave the pending marker, open the checkout page and begin polling.
    /// Must be called inside a tokio runtime.
    pub fn start(
        &self,
        notice_id: &str,
        payment_url: &str,
        method: WalletMethod,
    ) -> Result<PollHandle> {
        let url = checkout_url(payment_url, method)?;

        self.client
            .session()
            .save_pending(&PendingPayment::new(notice_id, method.id()))?;

        let mut handle = self.poller.prepare(notice_id, Some(self.clear_marker_hook()));

        tracing::info!(notice_id, method = %method, "redirecting to wallet checkout");
        if let Err(err) = self.launcher.launch(&url) {
            handle.cancel();
            return Err(err);
        }

        handle.begin_polling();
        Ok(handle)
    }

    /// Pick up a payment left in flight by a previous run, if any.
    /// Must be called inside a tokio runtime.
    pub fn resume_pending(&self) -> Option<PollHandle> {
        let pending = self.client.session().pending()?;
        tracing::info!(
            notice_id = %pending.notice_id,
            method = %pending.method,
            "resuming pending wallet payment"
        );
        Some(
            self.poller
                .start(&pending.notice_id, Some(self.clear_marker_hook())),
        )
    }

    pub fn pending(&self) -> Option<PendingPayment> {
        self.client.session().pending()
    }

    /// Forget an in-flight payment without polling it.
    pub fn abandon(&self) -> Result<()> {
        self.client.session().clear_pending()
    }

    /// Marker goes once the outcome is known or the user gave up. Timeouts
    /// and repeated failures leave it so the payment can be resumed later.
    fn clear_marker_hook(&self) -> OnSettled {
        let client = self.client.clone();
        Box::new(move |state: PollState| {
            if matches!(state, PollState::TimedOut | PollState::Unknown) {
                return;
            }
            if let Err(err) = client.session().clear_pending() {
                tracing::warn!(error = %err, "failed to clear pending payment marker");
            }
        })
    }
}

impl std::fmt::Debug for WalletCheckout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletCheckout")
            .field("client", &self.client)
            .field("poller", &self.poller)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_url_appends_channel() {
        assert_eq!(
            checkout_url("https://checkout.example/link/abc", WalletMethod::GCash).unwrap(),
            "https://checkout.example/link/abc?channel=PH_GCASH"
        );
        assert_eq!(
            checkout_url("https://checkout.example/link?ref=1", WalletMethod::PayMaya).unwrap(),
            "https://checkout.example/link?ref=1&channel=PH_MAYA"
        );
    }

    #[test]
    fn checkout_url_rejects_garbage() {
        assert!(matches!(
            checkout_url("not a url", WalletMethod::GCash),
            Err(ClientError::InvalidRequest(_))
        ));
    }

    #[test]
    fn method_ids_round_trip() {
        for method in [WalletMethod::GCash, WalletMethod::PayMaya] {
            assert_eq!(WalletMethod::from_id(method.id()), Some(method));
        }
        assert_eq!(WalletMethod::from_id("maya"), Some(WalletMethod::PayMaya));
        assert_eq!(WalletMethod::from_id("card"), None);
    }
}
