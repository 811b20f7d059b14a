use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default value is 1970-01-01 00:00:00 UTC.
///
/// UnixTimeStamp stores number of seconds elapsed since 1970-01-01 00:00:00 UTC
/// as `u32`, the width sftp v3 uses on the wire.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct UnixTimeStamp(u32);

impl UnixTimeStamp {
    /// Create new unix timestamp from `system_time`.
    ///
    /// Return `None` if `system_time` is before the unix epoch or too far
    /// in the future to fit in `u32`.
    pub fn new(system_time: SystemTime) -> Option<Self> {
        let elapsed = system_time.duration_since(UNIX_EPOCH).ok()?;
        u32::try_from(elapsed.as_secs()).ok().map(Self)
    }

    /// Return unix epoch, same as [`UnixTimeStamp::default`]
    pub const fn unix_epoch() -> Self {
        Self(0)
    }

    /// Create timestamp from number of seconds since the unix epoch.
    pub const fn from_raw(elapsed: u32) -> Self {
        Self(elapsed)
    }

    /// Into `u32` which is used to internally store the timestamp in seconds.
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    /// Convert timestamp to [`Duration`].
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0.into())
    }

    /// Convert timestamp back to [`SystemTime`].
    pub fn as_system_time(self) -> SystemTime {
        UNIX_EPOCH + self.as_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_system_time() {
        let ts = UnixTimeStamp::from_raw(1_134_000_000);
        assert_eq!(UnixTimeStamp::new(ts.as_system_time()), Some(ts));
        assert_eq!(UnixTimeStamp::unix_epoch(), UnixTimeStamp::default());
    }

    #[test]
    fn rejects_time_before_epoch() {
        let before = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(UnixTimeStamp::new(before), None);
    }
}
