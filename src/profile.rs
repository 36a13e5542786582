//! Device profile and the admission budget derived from it.
//!
//! The capacity is the bandwidth-delay product of the device expressed in
//! read buffers, scaled by an amplification factor for per-request overhead.
//! Files are charged one unit per `breakpoint` bytes, clamped to
//! `[1, capacity]` so no single file can ask for more than the whole budget.

use crate::error::ProfileError;

/// One mebibyte; the random-access preference is expressed in these.
pub const BREAKPOINT_UNIT: f64 = 1024.0 * 1024.0;

/// Largest accepted read buffer. Each worker allocates one of these.
pub const MAX_BUFFER_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    /// Sustained throughput in bytes per second.
    pub throughput: f64,
    /// Observed round-trip latency in seconds.
    pub latency: f64,
    /// Breakpoint in MiB: the size at which a file starts costing two units.
    pub random_access_preference: f64,
    /// Bytes per read call.
    pub buffer_size: u64,
    pub amplification: f64,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            throughput: 512.0 * 1024.0 * 1024.0,
            latency: 0.002,
            random_access_preference: 4.0,
            buffer_size: 64 * 1024,
            amplification: 2.0,
        }
    }
}

impl DeviceProfile {
    /// Bytes that must be in flight to keep the device busy.
    pub fn pipe_fatness(&self) -> f64 {
        self.throughput * self.latency
    }

    fn validate(&self) -> Result<(), ProfileError> {
        for (field, value) in [
            ("throughput", self.throughput),
            ("latency", self.latency),
            ("random_access_preference", self.random_access_preference),
            ("amplification", self.amplification),
        ] {
            if !value.is_finite() {
                return Err(ProfileError::NotFinite { field, value });
            }
        }
        for (field, value) in [
            ("throughput", self.throughput),
            ("latency", self.latency),
            ("random_access_preference", self.random_access_preference),
        ] {
            if value <= 0.0 {
                return Err(ProfileError::NotPositive { field, value });
            }
        }
        if self.amplification < 1.0 {
            return Err(ProfileError::Amplification(self.amplification));
        }
        if self.buffer_size == 0 {
            return Err(ProfileError::EmptyBuffer);
        }
        if self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ProfileError::BufferTooLarge {
                size: self.buffer_size,
                max: MAX_BUFFER_SIZE,
            });
        }
        Ok(())
    }
}

/// Capacity and breakpoint, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    capacity: u32,
    breakpoint: f64,
}

impl Budget {
    /// `capacity` is raised to 1 if zero; `breakpoint` must be positive.
    pub fn new(capacity: u32, breakpoint: f64) -> Self {
        debug_assert!(breakpoint > 0.0);
        Self {
            capacity: capacity.max(1),
            breakpoint,
        }
    }

    pub fn from_profile(profile: &DeviceProfile) -> Result<Self, ProfileError> {
        profile.validate()?;
        let in_flight = profile.amplification * profile.pipe_fatness();
        let units = (in_flight / profile.buffer_size as f64).ceil();
        let capacity = units.clamp(1.0, u32::MAX as f64) as u32;
        let breakpoint = profile.random_access_preference * BREAKPOINT_UNIT;
        Ok(Self::new(capacity, breakpoint))
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn breakpoint(&self) -> f64 {
        self.breakpoint
    }

    /// Admission cost of a file of `len` bytes.
    pub fn weight(&self, len: u64) -> u32 {
        let units = (len as f64 / self.breakpoint).ceil();
        units.clamp(1.0, self.capacity as f64) as u32
    }
}
