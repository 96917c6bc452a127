//! Time of interest used when checking certificate validity periods and CRL freshness

use core::{cmp::Ordering, fmt};
use std::time::{SystemTime, UNIX_EPOCH};

use x509_cert::time::Time;

/// Time of interest for the validation of a certificate or check against revocation, expressed as
/// seconds since the Unix epoch.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct TimeOfInterest(u64);

impl fmt::Display for TimeOfInterest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TimeOfInterest {
    /// Current system time
    pub fn now() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => TimeOfInterest(d.as_secs()),
            Err(_) => TimeOfInterest(0),
        }
    }

    /// Create a [`TimeOfInterest`] from Unix epoch
    pub fn from_unix_secs(v: u64) -> Self {
        TimeOfInterest(v)
    }

    /// Return Unix epoch (in seconds) for this value
    pub fn as_unix_secs(&self) -> u64 {
        self.0
    }
}

impl Default for TimeOfInterest {
    fn default() -> Self {
        Self::now()
    }
}

/// Converts an X.509 time value to seconds since the Unix epoch.
pub fn time_to_unix_secs(t: &Time) -> u64 {
    t.to_unix_duration().as_secs()
}

impl PartialEq<Time> for TimeOfInterest {
    fn eq(&self, other: &Time) -> bool {
        self.0 == time_to_unix_secs(other)
    }
}

impl PartialOrd<Time> for TimeOfInterest {
    fn partial_cmp(&self, other: &Time) -> Option<Ordering> {
        self.0.partial_cmp(&time_to_unix_secs(other))
    }
}

#[test]
fn toi_compare_test() {
    use der::DateTime;
    use x509_cert::time::Time;
    let dt = DateTime::new(2030, 1, 1, 0, 0, 0).unwrap();
    let t = Time::GeneralTime(der::asn1::GeneralizedTime::from_date_time(dt));
    let secs = time_to_unix_secs(&t);
    assert_eq!(secs, 1893456000);
    assert!(TimeOfInterest::from_unix_secs(secs - 1) < t);
    assert!(TimeOfInterest::from_unix_secs(secs + 1) > t);
    assert!(TimeOfInterest::from_unix_secs(secs) == t);
    assert!(TimeOfInterest::now().as_unix_secs() > 1_600_000_000);
}
