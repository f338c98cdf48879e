//! # Location Fuser
//!
//! Keeps the latest fix from the live subscription and turns it into a
//! per-tick position plus accumulated distance.
//!
//! Live fixes are forwarded by a spawned task into a mutex-guarded cell. A tick
//! holds the same lock for its whole duration, so a fix is never applied while
//! a record is being produced.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{choose_best, LocationSample, LocationSource, Provider, UpdateSettings};

/// Position data for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedPosition {
    /// Current fix, `None` until the first fix is obtained
    pub fix: Option<LocationSample>,
    /// Distance accumulated this session, in kilometers
    pub distance_km: f64,
}

/// Shared fix/distance state
#[derive(Debug, Default)]
pub struct FuserState {
    previous: Option<LocationSample>,
    current: Option<LocationSample>,
    distance_km: f64,
}

impl FuserState {
    /// State seeded with an initial fix
    pub fn seeded(fix: Option<LocationSample>) -> Self {
        Self {
            current: fix,
            ..Default::default()
        }
    }

    /// Replace the current fix; updates are never queued
    pub fn apply(&mut self, fix: LocationSample) {
        self.current = Some(fix);
    }

    /// Account for one tick and return the position to log
    ///
    /// Adds the distance from the previous to the current fix even when no new
    /// fix arrived since the last tick, which contributes zero.
    pub fn advance(&mut self) -> FusedPosition {
        if let Some(current) = self.current {
            if let Some(previous) = self.previous {
                self.distance_km += previous.distance_to(&current) / 1000.0;
            }
            self.previous = Some(current);
        }
        self.position()
    }

    /// Current position without advancing
    pub fn position(&self) -> FusedPosition {
        FusedPosition {
            fix: self.current,
            distance_km: self.distance_km,
        }
    }
}

/// Fuses the chosen provider's updates into a single position stream
pub struct LocationFuser {
    provider: Provider,
    settings: UpdateSettings,
    state: Arc<Mutex<FuserState>>,
    forwarder: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for LocationFuser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationFuser")
            .field("provider", &self.provider)
            .field("subscribed", &self.is_subscribed())
            .finish_non_exhaustive()
    }
}

impl LocationFuser {
    /// Seed from the freshest last-known fix of either provider
    ///
    /// Does not subscribe; call [`LocationFuser::subscribe`] for live updates.
    pub fn seed(source: &dyn LocationSource, provider: Provider, settings: UpdateSettings) -> Self {
        let best = choose_best(
            source.last_known_fix(Provider::Gps),
            source.last_known_fix(Provider::Network),
        );

        match &best {
            Some(fix) => debug!(
                "Seeded position {:.6},{:.6} (t={})",
                fix.latitude, fix.longitude, fix.time_ms
            ),
            None => debug!("No last-known position available"),
        }

        Self {
            provider,
            settings,
            state: Arc::new(Mutex::new(FuserState::seeded(best))),
            forwarder: None,
        }
    }

    /// Provider live updates are requested from
    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Whether a live subscription is currently forwarding fixes
    pub fn is_subscribed(&self) -> bool {
        matches!(&self.forwarder, Some(handle) if !handle.is_finished())
    }

    /// Start forwarding live fixes; no-op if already subscribed
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&mut self, source: &dyn LocationSource) {
        if self.is_subscribed() {
            return;
        }

        let updates = source.subscribe(self.provider, self.settings);
        self.forwarder = Some(tokio::spawn(forward_fixes(updates, Arc::clone(&self.state))));
        debug!(
            "Subscribed to {} updates (min interval {:?}, min distance {} m)",
            self.provider, self.settings.min_interval, self.settings.min_distance_m
        );
    }

    /// Stop forwarding live fixes, keeping the last fix and distance
    pub fn unsubscribe(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
            debug!("Unsubscribed from {} updates", self.provider);
        }
    }

    /// Lock the shared state for the duration of a tick
    pub async fn lock(&self) -> MutexGuard<'_, FuserState> {
        self.state.lock().await
    }
}

impl Drop for LocationFuser {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

async fn forward_fixes(mut updates: mpsc::Receiver<LocationSample>, state: Arc<Mutex<FuserState>>) {
    while let Some(fix) = updates.recv().await {
        trace!("Fix {:.6},{:.6} (t={})", fix.latitude, fix.longitude, fix.time_ms);
        state.lock().await.apply(fix);
    }
    debug!("Location update stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::mocks::MockLocationSource;

    fn p0() -> LocationSample {
        LocationSample::new(50.4501, 30.5234, 1_000)
    }

    fn p1() -> LocationSample {
        LocationSample::new(50.4511, 30.5244, 2_000)
    }

    fn p2() -> LocationSample {
        LocationSample::new(50.4530, 30.5230, 3_000)
    }

    #[test]
    fn test_advance_accumulates_sequence() {
        let mut state = FuserState::default();

        for fix in [p0(), p1(), p2()] {
            state.apply(fix);
            state.advance();
        }

        let expected = (p0().distance_to(&p1()) + p1().distance_to(&p2())) / 1000.0;
        let position = state.position();
        assert!((position.distance_km - expected).abs() < 1e-9);
        assert_eq!(position.fix, Some(p2()));
    }

    #[test]
    fn test_repeated_fix_contributes_zero() {
        let mut state = FuserState::default();
        state.apply(p0());
        state.advance();
        state.apply(p1());
        let after_move = state.advance().distance_km;

        // No new fix between ticks
        let after_stale = state.advance().distance_km;
        assert_eq!(after_move, after_stale);
        assert!(after_move > 0.0);
    }

    #[test]
    fn test_advance_without_fix() {
        let mut state = FuserState::default();

        let first = state.advance();
        let second = state.advance();

        assert_eq!(first.fix, None);
        assert_eq!(first.distance_km, 0.0);
        assert_eq!(second.distance_km, 0.0);
    }

    #[test]
    fn test_first_fix_sets_previous_without_distance() {
        let mut state = FuserState::default();
        state.advance();
        state.apply(p0());

        let position = state.advance();
        assert_eq!(position.fix, Some(p0()));
        assert_eq!(position.distance_km, 0.0);
    }

    #[test]
    fn test_seeded_fix_is_origin() {
        let mut state = FuserState::seeded(Some(p0()));
        state.advance();
        state.apply(p1());

        let position = state.advance();
        let expected = p0().distance_to(&p1()) / 1000.0;
        assert!((position.distance_km - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_seed_picks_fresher_fix() {
        let source = MockLocationSource::new(true, true);
        source.set_last_known(Provider::Gps, p1());
        source.set_last_known(Provider::Network, p0());

        let fuser = LocationFuser::seed(&source, Provider::Network, UpdateSettings::default());
        assert_eq!(fuser.lock().await.position().fix, Some(p1()));
        assert_eq!(fuser.provider(), Provider::Network);
        assert!(!fuser.is_subscribed());
    }

    #[tokio::test]
    async fn test_subscription_forwards_fixes() {
        let source = MockLocationSource::new(true, true);
        let mut fuser = LocationFuser::seed(&source, Provider::Gps, UpdateSettings::default());

        fuser.subscribe(&source);
        assert!(fuser.is_subscribed());
        assert_eq!(source.subscriptions(), vec![(Provider::Gps, UpdateSettings::default())]);

        assert!(source.push_fix(p2()).await);
        for _ in 0..100 {
            if fuser.lock().await.position().fix.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(fuser.lock().await.position().fix, Some(p2()));
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let source = MockLocationSource::new(true, true);
        let mut fuser = LocationFuser::seed(&source, Provider::Gps, UpdateSettings::default());

        fuser.subscribe(&source);
        fuser.subscribe(&source);
        assert_eq!(source.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_keeps_state() {
        let source = MockLocationSource::new(true, true);
        source.set_last_known(Provider::Network, p0());
        let mut fuser = LocationFuser::seed(&source, Provider::Network, UpdateSettings::default());

        fuser.subscribe(&source);
        fuser.lock().await.advance();
        fuser.unsubscribe();
        assert!(!fuser.is_subscribed());

        // Resubscribing requests a fresh stream; fix is retained
        fuser.subscribe(&source);
        assert_eq!(source.subscriptions().len(), 2);
        assert_eq!(fuser.lock().await.position().fix, Some(p0()));
    }
}
