//! Immutable credential values handed out by providers.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Refresh-token marker carried by webhook credentials, which never refresh.
pub const HOOK_REFRESH_TOKEN: &str = "hook";

/// Access material for one account, as produced by a credential provider.
///
/// Providers never mutate a value they handed out; a refresh yields a new one.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// Access token (the webhook secret for webhook credentials).
	pub access_token: TokenSecret,
	/// Refresh token, or [`HOOK_REFRESH_TOKEN`] for webhook credentials.
	pub refresh_token: TokenSecret,
	/// Lifetime in seconds counted from `issued_at`; `0` means the token never expires.
	pub expires_in: i64,
	/// Account domain without scheme, e.g. `acme.bitrix24.com`.
	pub domain: String,
	/// Account member identifier; empty for webhook credentials.
	pub member_id: String,
	/// Instant the credentials were produced.
	pub issued_at: OffsetDateTime,
}
impl Credentials {
	/// Builds webhook credentials: never expire, never refresh.
	pub fn hook(secret: TokenSecret, domain: impl Into<String>) -> Self {
		Self {
			access_token: secret,
			refresh_token: TokenSecret::new(HOOK_REFRESH_TOKEN),
			expires_in: 0,
			domain: domain.into(),
			member_id: String::new(),
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Builds refreshable credentials that only carry a refresh token so far.
	///
	/// The access token is empty, so providers report no usable credentials until the
	/// first refresh.
	pub fn pending_refresh(refresh_token: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(""),
			refresh_token: TokenSecret::new(refresh_token),
			expires_in: 0,
			domain: domain.into(),
			member_id: String::new(),
			issued_at: OffsetDateTime::now_utc(),
		}
	}

	/// Returns `true` for webhook credentials.
	pub fn is_hook(&self) -> bool {
		self.refresh_token.expose() == HOOK_REFRESH_TOKEN
	}

	/// Expiry instant, or `None` when the credentials never expire.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		(self.expires_in > 0).then(|| self.issued_at + Duration::seconds(self.expires_in))
	}

	/// Returns `true` if the credentials have expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at().is_some_and(|expires_at| instant >= expires_at)
	}

	/// Returns `true` when an access token is present and not expired at `instant`.
	pub fn is_usable_at(&self, instant: OffsetDateTime) -> bool {
		!self.access_token.is_empty() && !self.is_expired_at(instant)
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &if self.is_hook() { HOOK_REFRESH_TOKEN } else { "<redacted>" })
			.field("expires_in", &self.expires_in)
			.field("domain", &self.domain)
			.field("member_id", &self.member_id)
			.field("issued_at", &self.issued_at)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn hook_credentials_never_expire() {
		let credentials = Credentials::hook(TokenSecret::new("s3cret"), "acme.bitrix24.com");

		assert!(credentials.is_hook());
		assert_eq!(credentials.expires_at(), None);
		assert!(!credentials.is_expired_at(macros::datetime!(2999-01-01 00:00 UTC)));
		assert!(credentials.is_usable_at(OffsetDateTime::now_utc()));
	}

	#[test]
	fn refreshable_credentials_expire_after_lifetime() {
		let credentials = Credentials {
			access_token: TokenSecret::new("access"),
			refresh_token: TokenSecret::new("refresh"),
			expires_in: 3_600,
			domain: "acme.bitrix24.com".into(),
			member_id: "m-1".into(),
			issued_at: macros::datetime!(2025-01-01 00:00 UTC),
		};

		assert!(!credentials.is_hook());
		assert_eq!(credentials.expires_at(), Some(macros::datetime!(2025-01-01 01:00 UTC)));
		assert!(credentials.is_usable_at(macros::datetime!(2025-01-01 00:59 UTC)));
		assert!(credentials.is_expired_at(macros::datetime!(2025-01-01 01:00 UTC)));
	}

	#[test]
	fn pending_refresh_is_not_usable() {
		let credentials = Credentials::pending_refresh("refresh", "acme.bitrix24.com");

		assert!(!credentials.is_usable_at(OffsetDateTime::now_utc()));
	}

	#[test]
	fn debug_redacts_tokens() {
		let credentials = Credentials::hook(TokenSecret::new("s3cret"), "acme.bitrix24.com");
		let rendered = format!("{credentials:?}");

		assert!(!rendered.contains("s3cret"));
		assert!(rendered.contains("acme.bitrix24.com"));
	}
}
