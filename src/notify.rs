//! Notification capability.
//!
//! The cache and sync code never talks to a notification surface directly;
//! the bridge and the worker go through [`Notifier`].

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How long a notification stays up before it closes itself.
pub const AUTO_DISMISS: Duration = Duration::from_secs(5);

pub const DEFAULT_ICON: &str = "/custom/logo-192x192.png";
pub const DEFAULT_TAG: &str = "portfolio-notification";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
  /// Not asked yet
  Default,
  Granted,
  Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationOptions {
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub actions: Vec<NotificationAction>,
  pub data: Option<Value>,
}

impl Default for NotificationOptions {
  fn default() -> Self {
    Self {
      icon: DEFAULT_ICON.to_string(),
      badge: DEFAULT_ICON.to_string(),
      tag: DEFAULT_TAG.to_string(),
      actions: Vec::new(),
      data: None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(u64);

#[derive(Debug, Clone)]
pub struct Notification {
  pub id: NotificationId,
  pub title: String,
  pub body: String,
  pub options: NotificationOptions,
  pub shown_at: Instant,
}

/// What the host should do after a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
  /// Bring the page to the foreground
  pub focus: bool,
  /// Open a window at this path
  pub open: Option<String>,
}

pub trait Notifier: Send + Sync {
  fn permission(&self) -> Permission;

  /// Ask once; a decided permission is returned unchanged.
  fn request_permission(&self) -> Permission;

  /// Show a notification. Returns `None` unless permission is granted.
  fn show(&self, title: &str, body: &str, options: NotificationOptions) -> Option<NotificationId>;

  /// Close a notification. Closing twice is a no-op.
  fn close(&self, id: NotificationId);
}

static NEXT_NOTIFICATION_ID: AtomicU64 = AtomicU64::new(1);

/// In-process notification tray rendered by the monitor as toasts.
pub struct Toasts {
  permission: Mutex<Permission>,
  /// Answer given when permission is requested
  grant: Permission,
  active: Mutex<Vec<Notification>>,
}

impl Toasts {
  pub fn new(grant: Permission) -> Self {
    Self {
      permission: Mutex::new(Permission::Default),
      grant,
      active: Mutex::new(Vec::new()),
    }
  }

  /// Notifications still on screen at `now`; expired ones are dropped.
  pub fn visible(&self, now: Instant) -> Vec<Notification> {
    let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
    active.retain(|n| now.duration_since(n.shown_at) < AUTO_DISMISS);
    active.clone()
  }

  /// A click focuses the page and closes the notification.
  pub fn click(&self, id: NotificationId) -> ClickOutcome {
    self.close(id);
    ClickOutcome {
      focus: true,
      open: None,
    }
  }
}

impl Notifier for Toasts {
  fn permission(&self) -> Permission {
    *self.permission.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn request_permission(&self) -> Permission {
    let mut permission = self.permission.lock().unwrap_or_else(|e| e.into_inner());
    if *permission == Permission::Default {
      *permission = self.grant;
      info!(permission = ?*permission, "Notification permission decided");
    }
    *permission
  }

  fn show(&self, title: &str, body: &str, options: NotificationOptions) -> Option<NotificationId> {
    if self.permission() != Permission::Granted {
      debug!(title, "Notification suppressed, permission not granted");
      return None;
    }

    let id = NotificationId(NEXT_NOTIFICATION_ID.fetch_add(1, Ordering::SeqCst));
    let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
    // Same tag replaces the previous notification
    active.retain(|n| n.options.tag != options.tag);
    active.push(Notification {
      id,
      title: title.to_string(),
      body: body.to_string(),
      options,
      shown_at: Instant::now(),
    });
    Some(id)
  }

  fn close(&self, id: NotificationId) {
    self
      .active
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .retain(|n| n.id != id);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_nothing_shown_without_permission() {
    let toasts = Toasts::new(Permission::Denied);
    assert_eq!(toasts.request_permission(), Permission::Denied);
    assert!(toasts.show("t", "b", NotificationOptions::default()).is_none());
  }

  #[test]
  fn test_permission_asked_once() {
    let toasts = Toasts::new(Permission::Granted);
    assert_eq!(toasts.permission(), Permission::Default);
    assert_eq!(toasts.request_permission(), Permission::Granted);
    assert_eq!(toasts.request_permission(), Permission::Granted);
  }

  #[test]
  fn test_auto_dismiss_after_five_seconds() {
    let toasts = Toasts::new(Permission::Granted);
    toasts.request_permission();
    toasts.show("Hola", "b", NotificationOptions::default()).unwrap();

    let now = Instant::now();
    assert_eq!(toasts.visible(now).len(), 1);
    assert!(toasts.visible(now + AUTO_DISMISS).is_empty());
  }

  #[test]
  fn test_click_focuses_and_closes() {
    let toasts = Toasts::new(Permission::Granted);
    toasts.request_permission();
    let id = toasts.show("Hola", "b", NotificationOptions::default()).unwrap();

    let outcome = toasts.click(id);
    assert!(outcome.focus);
    assert!(toasts.visible(Instant::now()).is_empty());
  }

  #[test]
  fn test_same_tag_replaces() {
    let toasts = Toasts::new(Permission::Granted);
    toasts.request_permission();
    toasts.show("one", "", NotificationOptions::default());
    toasts.show("two", "", NotificationOptions::default());

    let visible = toasts.visible(Instant::now());
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].title, "two");
  }
}
