//! Security-focused logging module to track identity and authorization events

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Types of security events to track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication events
    AuthenticationFailed { username: Option<String>, reason: String },
    AuthenticationSuccess { user_id: i64 },
    TokenValidationFailed { user_id: Option<i64>, reason: String },
    SystemIdentityMissing { user_id: i64, system_identifier: String },

    // Authorization events
    PermissionDenied { user_id: i64, action: String },

    // Account changes
    UserCreated { user_id: i64, created_by: i64 },
    UserUpdated { user_id: i64, updated_by: i64 },
    PasswordRehashed { user_id: i64 },
}

impl SecurityEvent {
    /// Event key for tracking
    pub fn key(&self) -> &'static str {
        match self {
            SecurityEvent::AuthenticationFailed { .. } => "auth_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "auth_success",
            SecurityEvent::TokenValidationFailed { .. } => "token_validation_failed",
            SecurityEvent::SystemIdentityMissing { .. } => "system_identity_missing",
            SecurityEvent::PermissionDenied { .. } => "permission_denied",
            SecurityEvent::UserCreated { .. } => "user_created",
            SecurityEvent::UserUpdated { .. } => "user_updated",
            SecurityEvent::PasswordRehashed { .. } => "password_rehashed",
        }
    }
}

/// Security event with timestamp
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: SecurityEvent,
    timestamp: Instant,
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    events: RwLock<Vec<TimestampedEvent>>,
    event_counts: RwLock<HashMap<&'static str, usize>>,
    max_events: usize,
    alert_thresholds: HashMap<&'static str, usize>,
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityLogger {
    pub fn new() -> Self {
        let mut alert_thresholds = HashMap::new();
        alert_thresholds.insert("auth_failed", 5);
        alert_thresholds.insert("token_validation_failed", 10);
        alert_thresholds.insert("system_identity_missing", 1);
        alert_thresholds.insert("permission_denied", 20);

        Self {
            events: RwLock::new(Vec::new()),
            event_counts: RwLock::new(HashMap::new()),
            max_events: 10000,
            alert_thresholds,
        }
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let event_key = event.key();

        {
            let mut events = self.events.write().await;
            events.push(TimestampedEvent {
                event: event.clone(),
                timestamp: Instant::now(),
            });

            // Limit memory usage
            if events.len() > self.max_events {
                let events_to_remove = events.len() - self.max_events;
                events.drain(0..events_to_remove);
            }
        }

        {
            let mut counts = self.event_counts.write().await;
            let count = counts.entry(event_key).or_insert(0);
            *count += 1;

            if let Some(&threshold) = self.alert_thresholds.get(event_key) {
                if *count >= threshold {
                    Self::trigger_alert(event_key, *count, &event);
                    *count = 0; // Reset counter after alert
                }
            }
        }

        match event {
            SecurityEvent::AuthenticationFailed { username, reason } => {
                log::warn!("SECURITY: Authentication failed - User: {:?}, Reason: {}", username, reason);
            }
            SecurityEvent::AuthenticationSuccess { user_id } => {
                log::info!("SECURITY: Authentication success - User: {}", user_id);
            }
            SecurityEvent::TokenValidationFailed { user_id, reason } => {
                log::warn!("SECURITY: Token validation failed - User: {:?}, Reason: {}", user_id, reason);
            }
            SecurityEvent::SystemIdentityMissing { user_id, system_identifier } => {
                log::error!(
                    "SECURITY: System account vanished - User: {}, System identifier: {}",
                    user_id,
                    system_identifier
                );
            }
            SecurityEvent::PermissionDenied { user_id, action } => {
                log::warn!("SECURITY: Permission denied - User: {}, Action: {}", user_id, action);
            }
            SecurityEvent::UserCreated { user_id, created_by } => {
                log::info!("SECURITY: User {} created by {}", user_id, created_by);
            }
            SecurityEvent::UserUpdated { user_id, updated_by } => {
                log::info!("SECURITY: User {} updated by {}", user_id, updated_by);
            }
            SecurityEvent::PasswordRehashed { user_id } => {
                log::info!("SECURITY: Password hash upgraded - User: {}", user_id);
            }
        }
    }

    fn trigger_alert(event_type: &str, count: usize, sample_event: &SecurityEvent) {
        log::error!("SECURITY ALERT: {} events of type '{}' detected", count, event_type);
        log::error!("Sample event: {:?}", sample_event);
    }

    /// Get recent security events
    pub async fn get_recent_events(&self, duration: Duration) -> Vec<SecurityEvent> {
        let events = self.events.read().await;
        let now = Instant::now();

        events
            .iter()
            .filter(|event| now.duration_since(event.timestamp) <= duration)
            .map(|event| event.event.clone())
            .collect()
    }

    /// Counts since the last alert, per event kind
    pub async fn get_event_stats(&self) -> HashMap<&'static str, usize> {
        self.event_counts.read().await.clone()
    }
}

/// Global security logger instance
static SECURITY_LOGGER: OnceLock<Arc<SecurityLogger>> = OnceLock::new();

/// Get the global security logger, creating it on first use
pub fn security_logger() -> Arc<SecurityLogger> {
    SECURITY_LOGGER
        .get_or_init(|| Arc::new(SecurityLogger::new()))
        .clone()
}

/// Log a security event using the global logger
pub async fn log_security_event(event: SecurityEvent) {
    security_logger().log_event(event).await;
}
