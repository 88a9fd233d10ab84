//! Credential providers and the values they hand out.
//!
//! Every provider implements [`AuthActions`], the capability set the dispatcher relies
//! on: read the current credentials, refresh them, and report where REST calls go.

mod credentials;
mod hook;
mod oauth;
mod secret;

pub use credentials::*;
pub use hook::*;
pub use oauth::*;
pub use secret::*;

// self
use crate::_prelude::*;

/// Boxed future returned by [`AuthActions::refresh`].
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Capability set shared by webhook and OAuth credential providers.
///
/// Absence of credentials is a value (`None`), not an error, so callers can branch on
/// it and trigger [`AuthActions::refresh`] first.
pub trait AuthActions
where
	Self: Send + Sync,
{
	/// Current credentials, or `None` when a refresh is required before calling.
	fn credentials(&self) -> Option<Credentials>;

	/// Obtains fresh credentials, replacing the held value.
	fn refresh(&self) -> AuthFuture<'_, Credentials>;

	/// Replaces credentials the server rejected.
	///
	/// Providers that rotate tokens hand back the held credentials without a new exchange
	/// once they no longer match `rejected`.
	fn refresh_rejected(&self, _rejected: &Credentials) -> AuthFuture<'_, Credentials> {
		self.refresh()
	}

	/// Scheme and host of the account, e.g. `https://acme.bitrix24.com`.
	fn target_origin(&self) -> String;

	/// Base address every REST method path is appended to.
	///
	/// For webhooks this embeds the secret; never log it.
	fn target_origin_with_path(&self) -> String;
}
