//! # paynotice-client
//!
//! Rust SDK for the payment-notice backend.
//!
//! - [`Client`] attaches the stored bearer token to every call and, on a
//!   401, refreshes the credential pair once and retries the call once.
//! - [`WalletCheckout`] opens a notice's e-wallet checkout page and polls
//!   the notice until it is paid, fails, or the handle is dropped.
//!
//! ```rust,no_run
//! use paynotice_client::{Client, ClientOptions, WalletCheckout, WalletMethod, PollState};
//!
//! # async fn run() -> Result<(), paynotice_client::ClientError> {
//! let client = Client::new(ClientOptions::from_env()?)?;
//! client.login("juan", "hunter2").await?;
//!
//! let notices = client.my_payment_requests().await?;
//! let checkout = WalletCheckout::new(client.clone());
//! let mut handle = checkout.pay(&notices[0].id, WalletMethod::GCash).await?;
//!
//! if handle.wait().await == PollState::Completed {
//!     println!("paid");
//! }
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod errors;
pub mod poller;
pub mod storage;
pub mod structs;
pub mod transport;
pub mod wallet;

pub use errors::{ClientError, Result};
pub use poller::{CancelAdvice, PaymentPoller, PollHandle, PollPolicy, PollState, StatusSource};
pub use storage::{FileStore, MemoryStore, SecureStore};
pub use structs::announcement::{Announcement, NewAnnouncement};
pub use structs::client::{
    ApiRequest, Client, ClientOptions, LoginRequest, RegisterRequest, RegisterResult,
    DEFAULT_BASE_URL,
};
pub use structs::notice::{CreateNotice, PaymentLink, StatusUpdate};
pub use structs::session::{AccessClaims, Session};
pub use structs::user::{Appointment, SchoolYear, UpdateUser, UserAdmin, UserEligibility};
pub use structs::{display_label, NoticeStatus, PaymentNotice, PendingPayment, TokenPair};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use wallet::{checkout_url, BrowserLauncher, SystemBrowser, WalletCheckout, WalletMethod};
