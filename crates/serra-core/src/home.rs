//! # Home State
//!
//! The single owner of every record in the system.
//!
//! All collections are `BTreeMap`s keyed by typed ids, so iteration order
//! is always the id order and two states built by the same operations are
//! identical. Every mutation validates its input and returns a
//! [`SerraError`] instead of leaving the state half-updated.

use crate::condition::{MAX_CLOCK_SKEW_SECS, MetricReading, SensorSnapshot};
use crate::engine::{PlanInput, plan_scene};
use crate::model::{
    AuditEntry, Device, KillSwitch, Metric, Outlet, Reading, Sensor, Zone, ZoneMode,
};
use crate::report::ScenePlan;
use crate::scene::{
    Condition, RuleAction, Scene, SceneRule, SceneSettings, validate_rule_fields,
    validate_scene_fields,
};
use crate::session::{AutomationSession, SessionStatus, SessionView, validate_duration};
use crate::{
    AuditId, DeviceId, OutletId, ReadingId, Result, RuleId, SceneId, SensorId, SerraError,
    SessionId, Timestamp, ZoneId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Readings kept per sensor and metric; older ones are dropped.
pub const MAX_READINGS_PER_SERIES: usize = 500;

/// Audit entries kept; older ones are dropped.
pub const MAX_AUDIT_ENTRIES: usize = 1000;

/// Name given to the sensor created on first ingest into a zone.
pub const GATEWAY_SENSOR_NAME: &str = "Gateway Sensor";

// =============================================================================
// COUNTERS
// =============================================================================

/// Last id handed out per record kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub zone: u64,
    pub device: u64,
    pub outlet: u64,
    pub sensor: u64,
    pub reading: u64,
    pub scene: u64,
    pub rule: u64,
    pub session: u64,
    pub audit: u64,
}

fn bump(counter: &mut u64) -> u64 {
    *counter = counter.saturating_add(1);
    *counter
}

/// Record counts, for status output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeCounts {
    pub zones: usize,
    pub devices: usize,
    pub outlets: usize,
    pub sensors: usize,
    pub readings: usize,
    pub scenes: usize,
    pub rules: usize,
    pub sessions: usize,
    pub audit_entries: usize,
}

/// Editable outlet fields. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletConfig {
    pub custom_name: Option<String>,
    pub role: Option<String>,
    pub enabled: Option<bool>,
}

// =============================================================================
// HOME STATE
// =============================================================================

/// Zones, devices, sensors, scenes and sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomeState {
    pub(crate) zones: BTreeMap<ZoneId, Zone>,
    pub(crate) devices: BTreeMap<DeviceId, Device>,
    pub(crate) outlets: BTreeMap<OutletId, Outlet>,
    pub(crate) sensors: BTreeMap<SensorId, Sensor>,
    pub(crate) readings: BTreeMap<ReadingId, Reading>,
    pub(crate) scenes: BTreeMap<SceneId, Scene>,
    pub(crate) rules: BTreeMap<RuleId, SceneRule>,
    pub(crate) sessions: BTreeMap<SessionId, AutomationSession>,
    pub(crate) audit: BTreeMap<AuditId, AuditEntry>,
    pub(crate) kill_switch: KillSwitch,
    pub(crate) counters: Counters,
}

impl HomeState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record counts.
    #[must_use]
    pub fn counts(&self) -> HomeCounts {
        HomeCounts {
            zones: self.zones.len(),
            devices: self.devices.len(),
            outlets: self.outlets.len(),
            sensors: self.sensors.len(),
            readings: self.readings.len(),
            scenes: self.scenes.len(),
            rules: self.rules.len(),
            sessions: self.sessions.len(),
            audit_entries: self.audit.len(),
        }
    }

    /// Whether nothing has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    // -------------------------------------------------------------------------
    // Zones
    // -------------------------------------------------------------------------

    /// Create a zone with a unique slug.
    pub fn create_zone(&mut self, slug: &str, name: &str) -> Result<ZoneId> {
        let slug = slug.trim();
        if slug.is_empty() || name.trim().is_empty() {
            return Err(SerraError::Validation(
                "zone slug and name must not be empty".into(),
            ));
        }
        if self.zone_by_slug(slug).is_some() {
            return Err(SerraError::Conflict(format!(
                "zone slug '{slug}' already exists"
            )));
        }
        let id = ZoneId(bump(&mut self.counters.zone));
        self.zones.insert(
            id,
            Zone {
                id,
                slug: slug.to_string(),
                name: name.to_string(),
                mode: ZoneMode::Manual,
                active: true,
            },
        );
        Ok(id)
    }

    pub fn zone(&self, id: ZoneId) -> Result<&Zone> {
        self.zones
            .get(&id)
            .ok_or(SerraError::not_found("zone", id.0))
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.zones.values()
    }

    #[must_use]
    pub fn zone_by_slug(&self, slug: &str) -> Option<&Zone> {
        self.zones.values().find(|z| z.slug == slug)
    }

    pub fn set_zone_mode(&mut self, id: ZoneId, mode: ZoneMode) -> Result<()> {
        let zone = self
            .zones
            .get_mut(&id)
            .ok_or(SerraError::not_found("zone", id.0))?;
        zone.mode = mode;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Devices & outlets
    // -------------------------------------------------------------------------

    /// Register a device in a zone.
    pub fn add_device(
        &mut self,
        zone: ZoneId,
        provider: &str,
        provider_device_id: &str,
        name: &str,
        meta: BTreeMap<String, String>,
    ) -> Result<DeviceId> {
        self.zone(zone)?;
        if provider_device_id.trim().is_empty() || name.trim().is_empty() {
            return Err(SerraError::Validation(
                "device id and name must not be empty".into(),
            ));
        }
        let id = DeviceId(bump(&mut self.counters.device));
        self.devices.insert(
            id,
            Device {
                id,
                zone,
                provider: provider.to_string(),
                provider_device_id: provider_device_id.to_string(),
                name: name.to_string(),
                meta,
            },
        );
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> Result<&Device> {
        self.devices
            .get(&id)
            .ok_or(SerraError::not_found("device", id.0))
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Add an outlet to a device. Channels are unique per device.
    pub fn add_outlet(
        &mut self,
        device: DeviceId,
        channel: &str,
        role: Option<&str>,
        custom_name: Option<&str>,
    ) -> Result<OutletId> {
        self.device(device)?;
        if channel.trim().is_empty() {
            return Err(SerraError::Validation(
                "outlet channel must not be empty".into(),
            ));
        }
        if self
            .outlets
            .values()
            .any(|o| o.device == device && o.channel == channel)
        {
            return Err(SerraError::Conflict(format!(
                "{device} already has channel '{channel}'"
            )));
        }
        let id = OutletId(bump(&mut self.counters.outlet));
        let mut outlet = Outlet::new(id, device, channel);
        outlet.role = role.map(str::to_string);
        outlet.custom_name = custom_name.map(str::to_string);
        self.outlets.insert(id, outlet);
        Ok(id)
    }

    pub fn outlet(&self, id: OutletId) -> Result<&Outlet> {
        self.outlets
            .get(&id)
            .ok_or(SerraError::not_found("outlet", id.0))
    }

    fn outlet_mut(&mut self, id: OutletId) -> Result<&mut Outlet> {
        self.outlets
            .get_mut(&id)
            .ok_or(SerraError::not_found("outlet", id.0))
    }

    /// An outlet, checked to belong to `device`.
    pub fn device_outlet(&self, device: DeviceId, outlet: OutletId) -> Result<&Outlet> {
        self.device(device)?;
        match self.outlets.get(&outlet) {
            Some(o) if o.device == device => Ok(o),
            _ => Err(SerraError::not_found("outlet", outlet.0)),
        }
    }

    #[must_use]
    pub fn outlets_of_device(&self, device: DeviceId) -> Vec<&Outlet> {
        self.outlets
            .values()
            .filter(|o| o.device == device)
            .collect()
    }

    /// Outlets of every device in a zone, in id order.
    #[must_use]
    pub fn outlets_in_zone(&self, zone: ZoneId) -> Vec<&Outlet> {
        self.outlets
            .values()
            .filter(|o| {
                self.devices
                    .get(&o.device)
                    .is_some_and(|d| d.zone == zone)
            })
            .collect()
    }

    /// Zone an outlet lives in.
    pub fn outlet_zone(&self, outlet: OutletId) -> Result<ZoneId> {
        let outlet = self.outlet(outlet)?;
        Ok(self.device(outlet.device)?.zone)
    }

    pub fn configure_outlet(&mut self, id: OutletId, config: OutletConfig) -> Result<&Outlet> {
        if let Some(name) = &config.custom_name {
            if name.trim().is_empty() {
                return Err(SerraError::Validation(
                    "outlet name must not be empty".into(),
                ));
            }
        }
        let outlet = self.outlet_mut(id)?;
        if let Some(name) = config.custom_name {
            outlet.custom_name = Some(name);
        }
        if let Some(role) = config.role {
            outlet.role = Some(role);
        }
        if let Some(enabled) = config.enabled {
            outlet.enabled = enabled;
        }
        Ok(outlet)
    }

    /// Remember the state a device confirmed.
    pub fn record_outlet_state(&mut self, id: OutletId, state: bool) -> Result<()> {
        self.outlet_mut(id)?.last_state = state;
        Ok(())
    }

    /// Hold an outlet against automation, until `until` or until cleared.
    pub fn set_manual_override(&mut self, id: OutletId, until: Option<Timestamp>) -> Result<()> {
        let outlet = self.outlet_mut(id)?;
        outlet.manual_override = true;
        outlet.manual_override_until = until;
        Ok(())
    }

    pub fn clear_manual_override(&mut self, id: OutletId) -> Result<()> {
        let outlet = self.outlet_mut(id)?;
        outlet.manual_override = false;
        outlet.manual_override_until = None;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Sensors & readings
    // -------------------------------------------------------------------------

    pub fn add_sensor(
        &mut self,
        zone: ZoneId,
        provider: &str,
        provider_sensor_id: &str,
        kind: &str,
        name: &str,
    ) -> Result<SensorId> {
        self.zone(zone)?;
        let id = SensorId(bump(&mut self.counters.sensor));
        self.sensors.insert(
            id,
            Sensor {
                id,
                zone,
                provider: provider.to_string(),
                provider_sensor_id: provider_sensor_id.to_string(),
                kind: kind.to_string(),
                name: name.to_string(),
            },
        );
        Ok(id)
    }

    pub fn sensor(&self, id: SensorId) -> Result<&Sensor> {
        self.sensors
            .get(&id)
            .ok_or(SerraError::not_found("sensor", id.0))
    }

    #[must_use]
    pub fn sensors_in_zone(&self, zone: ZoneId) -> Vec<&Sensor> {
        self.sensors.values().filter(|s| s.zone == zone).collect()
    }

    /// Store a single reading, trimming the series to its cap.
    pub fn record_reading(
        &mut self,
        sensor: SensorId,
        metric: Metric,
        value: f64,
        observed_at: Timestamp,
    ) -> Result<ReadingId> {
        self.sensor(sensor)?;
        if !value.is_finite() {
            return Err(SerraError::Validation(format!(
                "{metric} reading must be a finite number"
            )));
        }
        let id = ReadingId(bump(&mut self.counters.reading));
        self.readings.insert(
            id,
            Reading {
                id,
                sensor,
                metric,
                value,
                observed_at,
            },
        );
        self.trim_series(sensor, metric);
        Ok(id)
    }

    fn trim_series(&mut self, sensor: SensorId, metric: Metric) {
        let series: Vec<ReadingId> = self
            .readings
            .values()
            .filter(|r| r.sensor == sensor && r.metric == metric)
            .map(|r| r.id)
            .collect();
        if series.len() > MAX_READINGS_PER_SERIES {
            let excess = series.len() - MAX_READINGS_PER_SERIES;
            for id in series.into_iter().take(excess) {
                self.readings.remove(&id);
            }
        }
    }

    /// Ingest a gateway payload for a zone.
    ///
    /// The zone's first sensor receives the readings; a gateway sensor is
    /// created when the zone has none. `observed_at` may not lie more than
    /// [`MAX_CLOCK_SKEW_SECS`] past `now`.
    pub fn ingest_reading(
        &mut self,
        zone: ZoneId,
        temperature: Option<f64>,
        humidity: Option<f64>,
        observed_at: Timestamp,
        now: Timestamp,
    ) -> Result<SensorId> {
        self.zone(zone)?;
        if temperature.is_none() && humidity.is_none() {
            return Err(SerraError::Validation(
                "payload carries neither temperature nor humidity".into(),
            ));
        }
        if observed_at > now.plus_secs(MAX_CLOCK_SKEW_SECS) {
            return Err(SerraError::Validation(format!(
                "observed_at {observed_at} is ahead of server time {now}"
            )));
        }
        for (metric, value) in [
            (Metric::Temperature, temperature),
            (Metric::Humidity, humidity),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(SerraError::Validation(format!(
                    "{metric} reading must be a finite number"
                )));
            }
        }

        let sensor = match self.sensors.values().find(|s| s.zone == zone) {
            Some(s) => s.id,
            None => self.add_sensor(
                zone,
                "gateway",
                &format!("gateway-{}", zone.0),
                "temperature_humidity",
                GATEWAY_SENSOR_NAME,
            )?,
        };

        if let Some(value) = temperature {
            self.record_reading(sensor, Metric::Temperature, value, observed_at)?;
        }
        if let Some(value) = humidity {
            self.record_reading(sensor, Metric::Humidity, value, observed_at)?;
        }
        Ok(sensor)
    }

    /// Latest reading per metric of one sensor.
    #[must_use]
    pub fn latest_for_sensor(&self, sensor: SensorId) -> SensorSnapshot {
        let mut snapshot = SensorSnapshot::default();
        for reading in self.readings.values().filter(|r| r.sensor == sensor) {
            snapshot.offer(
                reading.metric,
                MetricReading {
                    value: reading.value,
                    observed_at: reading.observed_at,
                    sensor: reading.sensor,
                },
            );
        }
        snapshot
    }

    /// Latest reading per metric across all sensors of a zone.
    #[must_use]
    pub fn latest_snapshot(&self, zone: ZoneId) -> SensorSnapshot {
        let mut snapshot = SensorSnapshot::default();
        for sensor in self.sensors_in_zone(zone) {
            let latest = self.latest_for_sensor(sensor.id);
            for metric in Metric::ALL {
                if let Some(reading) = latest.get(metric) {
                    snapshot.offer(metric, reading);
                }
            }
        }
        snapshot
    }

    // -------------------------------------------------------------------------
    // Scenes
    // -------------------------------------------------------------------------

    /// Create a scene. An active scene deactivates the zone's other scenes.
    pub fn create_scene(
        &mut self,
        zone: ZoneId,
        name: &str,
        slug: &str,
        settings: SceneSettings,
        active: bool,
    ) -> Result<SceneId> {
        self.zone(zone)?;
        validate_scene_fields(name, slug, &settings)?;
        self.ensure_unique_slug(zone, slug, None)?;

        let id = SceneId(bump(&mut self.counters.scene));
        self.scenes.insert(
            id,
            Scene {
                id,
                zone,
                name: name.to_string(),
                slug: slug.to_string(),
                settings,
                active: false,
            },
        );
        if active {
            self.activate_scene(id)?;
        }
        Ok(id)
    }

    fn ensure_unique_slug(&self, zone: ZoneId, slug: &str, except: Option<SceneId>) -> Result<()> {
        let taken = self
            .scenes
            .values()
            .any(|s| s.zone == zone && s.slug == slug && Some(s.id) != except);
        if taken {
            return Err(SerraError::Conflict(format!(
                "{zone} already has a scene with slug '{slug}'"
            )));
        }
        Ok(())
    }

    pub fn scene(&self, id: SceneId) -> Result<&Scene> {
        self.scenes
            .get(&id)
            .ok_or(SerraError::not_found("scene", id.0))
    }

    #[must_use]
    pub fn scenes_in_zone(&self, zone: ZoneId) -> Vec<&Scene> {
        self.scenes.values().filter(|s| s.zone == zone).collect()
    }

    #[must_use]
    pub fn active_scenes(&self) -> Vec<&Scene> {
        self.scenes.values().filter(|s| s.active).collect()
    }

    /// Replace a scene's editable fields.
    pub fn update_scene(
        &mut self,
        id: SceneId,
        name: &str,
        slug: &str,
        settings: SceneSettings,
        active: bool,
    ) -> Result<&Scene> {
        let zone = self.scene(id)?.zone;
        validate_scene_fields(name, slug, &settings)?;
        self.ensure_unique_slug(zone, slug, Some(id))?;

        if let Some(scene) = self.scenes.get_mut(&id) {
            scene.name = name.to_string();
            scene.slug = slug.to_string();
            scene.settings = settings;
        }
        if active {
            self.activate_scene(id)?;
        } else {
            self.deactivate_scene(id)?;
        }
        self.scene(id)
    }

    /// Delete a scene with its rules. A running session on it is stopped.
    pub fn delete_scene(&mut self, id: SceneId) -> Result<Scene> {
        let scene = self
            .scenes
            .remove(&id)
            .ok_or(SerraError::not_found("scene", id.0))?;
        self.rules.retain(|_, r| r.scene != id);

        let mut released = Vec::new();
        for session in self.sessions.values_mut() {
            if session.scene == id && session.is_running() {
                session.status = SessionStatus::Stopped;
                session.notes = Some("scene deleted".to_string());
                released.push(session.zone);
            }
        }
        for zone in released {
            self.set_zone_mode(zone, ZoneMode::Manual)?;
        }
        Ok(scene)
    }

    /// Make a scene the only active scene of its zone.
    pub fn activate_scene(&mut self, id: SceneId) -> Result<&Scene> {
        let zone = self.scene(id)?.zone;
        for scene in self.scenes.values_mut().filter(|s| s.zone == zone) {
            scene.active = scene.id == id;
        }
        self.scene(id)
    }

    pub fn deactivate_scene(&mut self, id: SceneId) -> Result<&Scene> {
        let scene = self
            .scenes
            .get_mut(&id)
            .ok_or(SerraError::not_found("scene", id.0))?;
        scene.active = false;
        Ok(scene)
    }

    // -------------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------------

    fn validate_rule(
        &self,
        scene: SceneId,
        name: &str,
        condition: &Condition,
        action: &RuleAction,
    ) -> Result<()> {
        let zone = self.scene(scene)?.zone;
        validate_rule_fields(name, condition, action)?;
        for (outlet, _) in action.targets() {
            match self.outlet_zone(outlet) {
                Ok(z) if z == zone => {}
                _ => {
                    return Err(SerraError::Validation(format!(
                        "{outlet} does not belong to {zone}"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn add_rule(
        &mut self,
        scene: SceneId,
        name: &str,
        condition: Condition,
        action: RuleAction,
        priority: i32,
    ) -> Result<RuleId> {
        self.validate_rule(scene, name, &condition, &action)?;
        let id = RuleId(bump(&mut self.counters.rule));
        self.rules.insert(
            id,
            SceneRule {
                id,
                scene,
                name: name.to_string(),
                condition,
                action,
                priority,
            },
        );
        Ok(id)
    }

    pub fn rule(&self, id: RuleId) -> Result<&SceneRule> {
        self.rules
            .get(&id)
            .ok_or(SerraError::not_found("rule", id.0))
    }

    /// Rules of a scene, highest priority first.
    #[must_use]
    pub fn rules_for_scene(&self, scene: SceneId) -> Vec<&SceneRule> {
        let mut rules: Vec<&SceneRule> =
            self.rules.values().filter(|r| r.scene == scene).collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        rules
    }

    pub fn update_rule(
        &mut self,
        id: RuleId,
        name: &str,
        condition: Condition,
        action: RuleAction,
        priority: i32,
    ) -> Result<&SceneRule> {
        let scene = self.rule(id)?.scene;
        self.validate_rule(scene, name, &condition, &action)?;
        let rule = self
            .rules
            .get_mut(&id)
            .ok_or(SerraError::not_found("rule", id.0))?;
        rule.name = name.to_string();
        rule.condition = condition;
        rule.action = action;
        rule.priority = priority;
        Ok(rule)
    }

    pub fn delete_rule(&mut self, id: RuleId) -> Result<SceneRule> {
        self.rules
            .remove(&id)
            .ok_or(SerraError::not_found("rule", id.0))
    }

    // -------------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------------

    /// Plan a scene against the zone's latest readings.
    ///
    /// Refused while the kill switch is active.
    pub fn plan_scene(
        &self,
        scene: SceneId,
        now: Timestamp,
        stale_after_secs: u64,
    ) -> Result<ScenePlan> {
        if self.kill_switch.active {
            return Err(SerraError::KillSwitchActive);
        }
        let scene = self.scene(scene)?;
        let input = PlanInput {
            scene,
            rules: self.rules_for_scene(scene.id),
            outlets: self.outlets_in_zone(scene.zone),
            snapshot: self.latest_snapshot(scene.zone),
            now,
            stale_after_secs,
        };
        plan_scene(&input)
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// The zone's running session, if any.
    #[must_use]
    pub fn running_session(&self, zone: ZoneId) -> Option<&AutomationSession> {
        self.sessions
            .values()
            .find(|s| s.zone == zone && s.is_running())
    }

    pub fn session(&self, id: SessionId) -> Result<&AutomationSession> {
        self.sessions
            .get(&id)
            .ok_or(SerraError::not_found("session", id.0))
    }

    /// Start automatic control of a zone by one of its scenes.
    ///
    /// A session already running in the zone is stopped, the scene becomes
    /// the zone's active scene and the zone switches to automatic.
    pub fn start_session(
        &mut self,
        zone: ZoneId,
        scene: SceneId,
        duration_minutes: u32,
        now: Timestamp,
    ) -> Result<SessionId> {
        if self.kill_switch.active {
            return Err(SerraError::KillSwitchActive);
        }
        self.zone(zone)?;
        if self.scene(scene)?.zone != zone {
            return Err(SerraError::Validation(format!(
                "{scene} does not belong to {zone}"
            )));
        }
        validate_duration(duration_minutes)?;

        for session in self.sessions.values_mut() {
            if session.zone == zone && session.is_running() {
                session.status = SessionStatus::Stopped;
                session.notes = Some("replaced by a new session".to_string());
            }
        }

        self.activate_scene(scene)?;
        self.set_zone_mode(zone, ZoneMode::Automatic)?;

        let id = SessionId(bump(&mut self.counters.session));
        self.sessions.insert(
            id,
            AutomationSession {
                id,
                zone,
                scene,
                started_at: now,
                duration_minutes,
                last_evaluation_at: None,
                status: SessionStatus::Running,
                notes: None,
            },
        );
        Ok(id)
    }

    /// Stop the zone's running session and return the zone to manual.
    pub fn stop_session(&mut self, zone: ZoneId) -> Result<SessionId> {
        self.zone(zone)?;
        let session = self
            .sessions
            .values_mut()
            .find(|s| s.zone == zone && s.is_running())
            .ok_or(SerraError::not_found("running session in zone", zone.0))?;
        session.status = SessionStatus::Stopped;
        let id = session.id;
        self.set_zone_mode(zone, ZoneMode::Manual)?;
        Ok(id)
    }

    /// Complete every running session whose time is up.
    ///
    /// Returns the completed sessions; their zones go back to manual.
    pub fn expire_sessions(&mut self, now: Timestamp) -> Vec<SessionId> {
        let mut expired = Vec::new();
        for session in self.sessions.values_mut() {
            if session.is_expired(now) {
                session.status = SessionStatus::Completed;
                expired.push((session.id, session.zone));
            }
        }
        for (_, zone) in &expired {
            if let Some(z) = self.zones.get_mut(zone) {
                z.mode = ZoneMode::Manual;
            }
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }

    /// Current session of a zone, completing it first if it ran out.
    pub fn session_status(&mut self, zone: ZoneId, now: Timestamp) -> Result<Option<SessionView>> {
        self.zone(zone)?;
        self.expire_sessions(now);
        Ok(self
            .running_session(zone)
            .map(|s| s.view(now, self.scene_name(s.scene))))
    }

    /// Sessions of a zone, newest first.
    pub fn session_history(
        &self,
        zone: ZoneId,
        limit: usize,
        now: Timestamp,
    ) -> Result<Vec<SessionView>> {
        self.zone(zone)?;
        let mut sessions: Vec<&AutomationSession> =
            self.sessions.values().filter(|s| s.zone == zone).collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(sessions
            .into_iter()
            .take(limit)
            .map(|s| s.view(now, self.scene_name(s.scene)))
            .collect())
    }

    /// Record that a session's scene was just evaluated.
    pub fn note_session_evaluation(&mut self, id: SessionId, at: Timestamp) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(SerraError::not_found("session", id.0))?;
        session.last_evaluation_at = Some(at);
        Ok(())
    }

    /// Attach a note to a session, e.g. an evaluation error.
    pub fn annotate_session(&mut self, id: SessionId, note: impl Into<String>) -> Result<()> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(SerraError::not_found("session", id.0))?;
        session.notes = Some(note.into());
        Ok(())
    }

    fn scene_name(&self, id: SceneId) -> String {
        self.scenes
            .get(&id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "Unknown Scene".to_string())
    }

    // -------------------------------------------------------------------------
    // Kill switch
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    pub fn activate_kill_switch(&mut self, reason: &str, now: Timestamp) -> Result<&KillSwitch> {
        if self.kill_switch.active {
            return Err(SerraError::Conflict("kill switch is already active".into()));
        }
        self.kill_switch = KillSwitch {
            active: true,
            reason: Some(reason.to_string()),
            activated_at: Some(now),
            deactivated_at: None,
        };
        let details = BTreeMap::from([("reason".to_string(), reason.to_string())]);
        self.audit("kill_switch_activated", details, now);
        Ok(&self.kill_switch)
    }

    pub fn deactivate_kill_switch(&mut self, now: Timestamp) -> Result<&KillSwitch> {
        if !self.kill_switch.active {
            return Err(SerraError::Conflict("kill switch is not active".into()));
        }
        self.kill_switch.active = false;
        self.kill_switch.deactivated_at = Some(now);
        self.audit("kill_switch_deactivated", BTreeMap::new(), now);
        Ok(&self.kill_switch)
    }

    // -------------------------------------------------------------------------
    // Audit
    // -------------------------------------------------------------------------

    /// Append an audit entry, dropping the oldest beyond the cap.
    pub fn audit(
        &mut self,
        action: &str,
        details: BTreeMap<String, String>,
        at: Timestamp,
    ) -> AuditId {
        let id = AuditId(bump(&mut self.counters.audit));
        self.audit.insert(
            id,
            AuditEntry {
                id,
                action: action.to_string(),
                details,
                at,
            },
        );
        while self.audit.len() > MAX_AUDIT_ENTRIES {
            self.audit.pop_first();
        }
        id
    }

    /// Audit entries, newest first.
    #[must_use]
    pub fn audit_log(&self, limit: usize) -> Vec<&AuditEntry> {
        self.audit.values().rev().take(limit).collect()
    }

    // -------------------------------------------------------------------------
    // Seed
    // -------------------------------------------------------------------------

    /// Populate an empty state with the greenhouse and terrarium.
    ///
    /// Returns `false` and changes nothing if any zone exists.
    pub fn seed_default(&mut self) -> Result<bool> {
        if !self.is_empty() {
            return Ok(false);
        }

        let serra = self.create_zone("serra", "Serra 🌱")?;
        let terrario = self.create_zone("terrario", "Terrario 🐢")?;

        let strip_meta = || {
            BTreeMap::from([
                ("type".to_string(), "power_strip".to_string()),
                ("model".to_string(), "ANTELA".to_string()),
            ])
        };

        let serra_strip = self.add_device(
            serra,
            "tuya",
            "bfac84583c14518dedjatx",
            "Alimentazione Serra",
            strip_meta(),
        )?;
        for (channel, role, name) in [
            ("switch_1", "heating", "Presa 1"),
            ("switch_2", "lighting", "Presa 2"),
            ("switch_3", "ventilation", "Presa 3"),
            ("switch_4", "irrigation", "Presa 4"),
            ("switch_5", "usb", "USB (2A+1C)"),
        ] {
            self.add_outlet(serra_strip, channel, Some(role), Some(name))?;
        }

        let terrario_strip = self.add_device(
            terrario,
            "tuya",
            "bf706e173c8fca8ec2evnv",
            "Alimentazione Terrario",
            strip_meta(),
        )?;
        for (channel, role, name) in [
            ("switch_1", "uvb", "UVB"),
            ("switch_2", "heating", "Spot Riscaldamento"),
            ("switch_3", "ceramic", "Ceramica Notte"),
            ("switch_4", "humidity", "Umidificatore"),
            ("switch_5", "usb", "USB (2A+1C)"),
        ] {
            self.add_outlet(terrario_strip, channel, Some(role), Some(name))?;
        }

        self.add_sensor(
            serra,
            "nous_e6",
            "bffca357e3c45a16783rsa",
            "temperature_humidity",
            "Sensore Serra",
        )?;
        self.add_sensor(
            terrario,
            "nous_e6",
            "bfcd3d17b88bd88cc0qeie",
            "temperature_humidity",
            "Sensore Terrario",
        )?;
        Ok(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================
