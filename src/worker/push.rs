//! Push notification payloads and click handling.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A notification ready to display. Every field has an app-level default, so
/// a push payload only needs to carry the fields it wants to override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
  #[serde(default = "default_title")]
  pub title: String,
  #[serde(default = "default_body")]
  pub body: String,
  #[serde(default = "default_icon")]
  pub icon: String,
  #[serde(default = "default_badge")]
  pub badge: String,
  #[serde(default = "default_vibrate")]
  pub vibrate: Vec<u32>,
  #[serde(default)]
  pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
  /// Where a click on the notification takes the user
  #[serde(default = "default_url")]
  pub url: String,
}

impl Default for NotificationData {
  fn default() -> Self {
    Self { url: default_url() }
  }
}

fn default_title() -> String {
  "TripTracker".to_string()
}

fn default_body() -> String {
  "Something happened with your vehicle".to_string()
}

fn default_icon() -> String {
  "/static/images/icon-192x192.png".to_string()
}

fn default_badge() -> String {
  "/static/images/badge-72x72.png".to_string()
}

fn default_vibrate() -> Vec<u32> {
  vec![100, 50, 100]
}

fn default_url() -> String {
  "/".to_string()
}

impl Default for Notification {
  fn default() -> Self {
    Self {
      title: default_title(),
      body: default_body(),
      icon: default_icon(),
      badge: default_badge(),
      vibrate: default_vibrate(),
      data: NotificationData::default(),
    }
  }
}

impl Notification {
  /// Build a notification from a push payload. Fields present in the payload
  /// override the defaults; an absent or malformed payload yields the
  /// defaults unchanged.
  pub fn from_push_payload(payload: Option<&[u8]>) -> Self {
    let Some(bytes) = payload else {
      return Self::default();
    };

    match serde_json::from_slice(bytes) {
      Ok(notification) => notification,
      Err(e) => {
        warn!("Ignoring malformed push payload: {}", e);
        Self::default()
      }
    }
  }
}

/// What a notification click should do, given the app windows already open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction {
  /// Focus the open window at this index
  Focus(usize),
  /// No window shows the target; open a new one at this URL
  Open(String),
}

/// Resolve a click on a notification: reuse a window already showing the
/// target URL, otherwise open a new one.
pub fn click_action(target_url: &str, open_windows: &[String]) -> ClickAction {
  match open_windows.iter().position(|url| url == target_url) {
    Some(index) => ClickAction::Focus(index),
    None => ClickAction::Open(target_url.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_payload_yields_defaults() {
    let notification = Notification::from_push_payload(None);
    assert_eq!(notification.title, "TripTracker");
    assert_eq!(notification.body, "Something happened with your vehicle");
    assert_eq!(notification.vibrate, vec![100, 50, 100]);
    assert_eq!(notification.data.url, "/");
  }

  #[test]
  fn payload_fields_override_defaults() {
    let payload = br#"{"title": "Oil change due", "data": {"url": "/todos/"}}"#;
    let notification = Notification::from_push_payload(Some(payload));

    assert_eq!(notification.title, "Oil change due");
    assert_eq!(notification.data.url, "/todos/");
    // Untouched fields keep their defaults
    assert_eq!(notification.icon, "/static/images/icon-192x192.png");
    assert_eq!(notification.badge, "/static/images/badge-72x72.png");
  }

  #[test]
  fn malformed_payload_falls_back_to_defaults() {
    let notification = Notification::from_push_payload(Some(b"not json"));
    assert_eq!(notification, Notification::default());
  }

  #[test]
  fn click_focuses_matching_window() {
    let windows = vec!["/dashboard/".to_string(), "/todos/".to_string()];
    assert_eq!(click_action("/todos/", &windows), ClickAction::Focus(1));
  }

  #[test]
  fn click_opens_new_window_when_no_match() {
    let windows = vec!["/dashboard/".to_string()];
    assert_eq!(click_action("/todos/", &windows), ClickAction::Open("/todos/".to_string()));
  }
}
