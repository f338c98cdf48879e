//! # Location Module
//!
//! Position input for location-enabled sessions.
//!
//! This module handles:
//! - Position fixes from the GPS and network providers
//! - Choosing the freshest last-known fix when a session starts
//! - Great-circle distance between fixes
//! - Fusing live updates into a single position and accumulated distance

pub mod fuser;

pub use fuser::{FusedPosition, FuserState, LocationFuser};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Mean Earth radius in meters used for haversine distance
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Default minimum interval between live position updates
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(250);

/// Position provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Satellite positioning
    Gps,
    /// Cell/Wi-Fi based positioning
    Network,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gps => write!(f, "gps"),
            Provider::Network => write!(f, "network"),
        }
    }
}

/// A single position reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Fix time in milliseconds since the Unix epoch
    pub time_ms: i64,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, time_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            time_ms,
        }
    }

    /// Great-circle distance to `other` in meters (haversine)
    ///
    /// # Examples
    ///
    /// ```
    /// use telemetry_logger::location::LocationSample;
    ///
    /// let a = LocationSample::new(0.0, 0.0, 0);
    /// let b = LocationSample::new(0.0, 1.0, 0);
    /// assert!((a.distance_to(&b) - 111_195.0).abs() < 1.0);
    /// ```
    pub fn distance_to(&self, other: &LocationSample) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Live update request parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateSettings {
    /// Minimum time between reported fixes
    pub min_interval: Duration,
    /// Minimum movement between reported fixes, in meters
    pub min_distance_m: f32,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            min_distance_m: 0.0,
        }
    }
}

/// Platform location service
///
/// Dropping the receiver returned by [`LocationSource::subscribe`] ends the
/// subscription.
pub trait LocationSource: Send + Sync {
    /// Whether the provider is currently enabled on the device
    fn is_provider_enabled(&self, provider: Provider) -> bool;

    /// Most recent fix the provider has cached, if any
    fn last_known_fix(&self, provider: Provider) -> Option<LocationSample>;

    /// Start live updates from `provider`
    fn subscribe(
        &self,
        provider: Provider,
        settings: UpdateSettings,
    ) -> mpsc::Receiver<LocationSample>;
}

/// Pick the fresher of the GPS and network last-known fixes
///
/// The GPS fix wins only when strictly newer; a tie goes to the network fix.
/// A missing fix counts as time zero.
///
/// # Examples
///
/// ```
/// use telemetry_logger::location::{choose_best, LocationSample};
///
/// let gps = LocationSample::new(1.0, 1.0, 1000);
/// let net = LocationSample::new(2.0, 2.0, 1000);
/// assert_eq!(choose_best(Some(gps), Some(net)), Some(net));
/// ```
pub fn choose_best(
    gps: Option<LocationSample>,
    network: Option<LocationSample>,
) -> Option<LocationSample> {
    let gps_time = gps.map_or(0, |fix| fix.time_ms);
    let network_time = network.map_or(0, |fix| fix.time_ms);

    if gps_time > network_time {
        gps
    } else {
        network
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Inner {
        gps_enabled: bool,
        network_enabled: bool,
        last_gps: Option<LocationSample>,
        last_network: Option<LocationSample>,
        subscriptions: Vec<(Provider, UpdateSettings)>,
        sender: Option<mpsc::Sender<LocationSample>>,
    }

    /// Mock location service for testing
    #[derive(Clone, Default)]
    pub struct MockLocationSource {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockLocationSource {
        pub fn new(gps_enabled: bool, network_enabled: bool) -> Self {
            Self {
                inner: Arc::new(Mutex::new(Inner {
                    gps_enabled,
                    network_enabled,
                    ..Default::default()
                })),
            }
        }

        pub fn set_last_known(&self, provider: Provider, fix: LocationSample) {
            let mut inner = self.inner.lock().unwrap();
            match provider {
                Provider::Gps => inner.last_gps = Some(fix),
                Provider::Network => inner.last_network = Some(fix),
            }
        }

        /// Subscriptions requested so far, oldest first
        pub fn subscriptions(&self) -> Vec<(Provider, UpdateSettings)> {
            self.inner.lock().unwrap().subscriptions.clone()
        }

        /// Deliver a fix to the most recent subscriber
        ///
        /// Returns false if there is no live subscriber.
        pub async fn push_fix(&self, fix: LocationSample) -> bool {
            let sender = self.inner.lock().unwrap().sender.clone();
            match sender {
                Some(sender) => sender.send(fix).await.is_ok(),
                None => false,
            }
        }
    }

    impl LocationSource for MockLocationSource {
        fn is_provider_enabled(&self, provider: Provider) -> bool {
            let inner = self.inner.lock().unwrap();
            match provider {
                Provider::Gps => inner.gps_enabled,
                Provider::Network => inner.network_enabled,
            }
        }

        fn last_known_fix(&self, provider: Provider) -> Option<LocationSample> {
            let inner = self.inner.lock().unwrap();
            match provider {
                Provider::Gps => inner.last_gps,
                Provider::Network => inner.last_network,
            }
        }

        fn subscribe(
            &self,
            provider: Provider,
            settings: UpdateSettings,
        ) -> mpsc::Receiver<LocationSample> {
            let (tx, rx) = mpsc::channel(16);
            let mut inner = self.inner.lock().unwrap();
            inner.subscriptions.push((provider, settings));
            inner.sender = Some(tx);
            rx
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_best_newer_gps_wins() {
        let gps = LocationSample::new(50.0, 30.0, 2000);
        let net = LocationSample::new(51.0, 31.0, 1000);
        assert_eq!(choose_best(Some(gps), Some(net)), Some(gps));
    }

    #[test]
    fn test_choose_best_newer_network_wins() {
        let gps = LocationSample::new(50.0, 30.0, 1000);
        let net = LocationSample::new(51.0, 31.0, 2000);
        assert_eq!(choose_best(Some(gps), Some(net)), Some(net));
    }

    #[test]
    fn test_choose_best_tie_goes_to_network() {
        let gps = LocationSample::new(50.0, 30.0, 1500);
        let net = LocationSample::new(51.0, 31.0, 1500);
        assert_eq!(choose_best(Some(gps), Some(net)), Some(net));
    }

    #[test]
    fn test_choose_best_missing_fixes() {
        let gps = LocationSample::new(50.0, 30.0, 1500);
        let net = LocationSample::new(51.0, 31.0, 1500);

        assert_eq!(choose_best(Some(gps), None), Some(gps));
        assert_eq!(choose_best(None, Some(net)), Some(net));
        assert_eq!(choose_best(None, None), None);
    }

    #[test]
    fn test_distance_same_point_is_zero() {
        let p = LocationSample::new(48.8566, 2.3522, 0);
        assert_eq!(p.distance_to(&p), 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        // Paris to London, roughly 343.5 km great-circle
        let paris = LocationSample::new(48.8566, 2.3522, 0);
        let london = LocationSample::new(51.5074, -0.1278, 0);
        let km = paris.distance_to(&london) / 1000.0;
        assert!((km - 343.5).abs() < 1.0, "got {} km", km);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = LocationSample::new(10.0, 20.0, 0);
        let b = LocationSample::new(10.5, 19.5, 0);
        assert!((a.distance_to(&b) - b.distance_to(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_default_update_settings() {
        let settings = UpdateSettings::default();
        assert_eq!(settings.min_interval, Duration::from_millis(250));
        assert_eq!(settings.min_distance_m, 0.0);
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(Provider::Gps.to_string(), "gps");
        assert_eq!(Provider::Network.to_string(), "network");
    }
}
