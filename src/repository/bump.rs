//! Version/expiry operator
//!
//! `bump_version` and `bump_expiry` are always applied as a pair, exactly
//! once per touched document per cycle. Neither is idempotent.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use repo_metadata::{Metadata, RolePayload};

/// Increment the document version by one
pub fn bump_version<T: RolePayload>(md: &mut Metadata<T>) {
    md.signed.header_mut().version += 1;
}

/// Set expiry to `now` truncated to whole seconds plus `interval`
///
/// Returns the new expiry, or `None` with the document untouched if it
/// falls outside the representable date range.
pub fn bump_expiry<T: RolePayload>(
    md: &mut Metadata<T>,
    now: DateTime<Utc>,
    interval: Duration,
) -> Option<DateTime<Utc>> {
    let expires = now.trunc_subsecs(0).checked_add_signed(interval)?;
    md.signed.header_mut().expires = expires;
    Some(expires)
}

/// Whether the document expires within `window` of `now`
///
/// Already expired documents count as expiring.
pub fn expires_within<T: RolePayload>(
    md: &Metadata<T>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    md.expires() - now < window
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use repo_metadata::Targets;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_bump_version_increments_by_one() {
        let mut md = Metadata::new(Targets::new(now()));
        assert_eq!(md.version(), 1);
        bump_version(&mut md);
        assert_eq!(md.version(), 2);
        bump_version(&mut md);
        assert_eq!(md.version(), 3);
    }

    #[test]
    fn test_bump_expiry_drops_subseconds() {
        let mut md = Metadata::new(Targets::new(now()));
        let with_millis = now() + Duration::milliseconds(750);
        let expires = bump_expiry(&mut md, with_millis, Duration::days(1));
        assert_eq!(expires, Some(now() + Duration::days(1)));
        assert_eq!(md.expires(), now() + Duration::days(1));
    }

    #[test]
    fn test_bump_expiry_out_of_range_leaves_document() {
        let mut md = Metadata::new(Targets::new(now()));
        let interval = Duration::try_days(100_000_000).unwrap();
        assert_eq!(bump_expiry(&mut md, now(), interval), None);
        assert_eq!(md.expires(), now());
    }

    #[test]
    fn test_expires_within_window() {
        let md = Metadata::new(Targets::new(now() + Duration::minutes(30)));
        assert!(expires_within(&md, now(), Duration::hours(1)));
        assert!(!expires_within(&md, now(), Duration::minutes(30)));
        assert!(!expires_within(&md, now(), Duration::minutes(10)));
    }

    #[test]
    fn test_expired_document_is_within_window() {
        let md = Metadata::new(Targets::new(now() - Duration::days(2)));
        assert!(expires_within(&md, now(), Duration::hours(1)));
    }
}
