use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::message::Cookie;
use crate::Error;

type HmacSha256 = Hmac<Sha256>;

/// Size of every cookie we issue and accept.
pub const COOKIE_LEN: usize = 20;

const SECRET_LEN: usize = 32;

const _: () = assert!(COOKIE_LEN <= Cookie::MAX_LEN);

struct Secret([u8; SECRET_LEN]);

impl Secret {
    fn random() -> Self {
        let mut s = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut s);
        Secret(s)
    }

    fn mac(&self, addr: &SocketAddr) -> Result<HmacSha256, Error> {
        let mut mac = HmacSha256::new_from_slice(&self.0).map_err(|_| Error::InvalidKey)?;
        mac.update(addr.to_string().as_bytes());
        Ok(mac)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Issues and checks HelloVerifyRequest cookies.
///
/// A cookie is HMAC-SHA256 over the peer address, truncated to
/// [`COOKIE_LEN`]. The key rotates every `interval`; a cookie minted with the
/// previous key is still honored until the next rotation, provided that
/// rotation happened less than two intervals after the one before it.
pub struct CookieAuthority {
    current: Secret,
    previous: Option<Secret>,
    rotated_at: Instant,
    interval: Duration,
}

impl CookieAuthority {
    pub fn new(now: Instant, interval: Duration) -> Self {
        CookieAuthority {
            current: Secret::random(),
            previous: None,
            rotated_at: now,
            interval,
        }
    }

    /// Mint a cookie for `addr`.
    pub fn derive(&mut self, now: Instant, addr: &SocketAddr) -> Result<Cookie, Error> {
        self.maybe_rotate(now);

        let tag = self.current.mac(addr)?.finalize().into_bytes();
        truncate(&tag)
    }

    /// Check a cookie echoed back by `addr`.
    ///
    /// Tries the current secret, then the previous one if still retained.
    pub fn verify(&mut self, now: Instant, addr: &SocketAddr, cookie: &[u8]) -> bool {
        self.maybe_rotate(now);

        if cookie.len() != COOKIE_LEN {
            return false;
        }

        let check = |secret: &Secret| {
            secret
                .mac(addr)
                .map(|mac| mac.verify_truncated_left(cookie).is_ok())
                .unwrap_or(false)
        };

        if check(&self.current) {
            return true;
        }

        match &self.previous {
            Some(previous) if check(previous) => {
                trace!("Cookie accepted with previous secret");
                true
            }
            _ => false,
        }
    }

    /// Whether a previous secret is still honored.
    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    fn maybe_rotate(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.rotated_at);
        if elapsed < self.interval {
            return;
        }

        let old = std::mem::replace(&mut self.current, Secret::random());

        // Dropping a Secret zeroizes it.
        self.previous = if elapsed < self.interval * 2 {
            Some(old)
        } else {
            None
        };

        self.rotated_at = now;
        debug!(
            "Rotated cookie secret after {:?} (previous kept: {})",
            elapsed,
            self.previous.is_some()
        );
    }
}

/// The leading [`COOKIE_LEN`] bytes of a digest.
fn truncate(digest: &[u8]) -> Result<Cookie, Error> {
    let cookie = digest
        .get(..COOKIE_LEN)
        .ok_or(Error::CookieTooLong(COOKIE_LEN, digest.len()))?;
    Ok(Cookie::try_new(cookie)?)
}

impl fmt::Debug for CookieAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieAuthority")
            .field("previous", &self.previous.is_some())
            .field("rotated_at", &self.rotated_at)
            .field("interval", &self.interval)
            .finish()
    }
}
