use color_eyre::{eyre::eyre, Result};
use std::fmt;

/// Lifecycle of the request router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, nothing cached yet
  Parsed,
  /// Precache in progress
  Installing,
  /// Precache populated, waiting to activate
  Installed,
  /// Purging stale generations
  Activating,
  /// Intercepting requests
  Activated,
  /// Install failed; requests bypass the router
  Redundant,
}

/// Lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
  Install,
  InstallSucceeded,
  InstallFailed,
  Activate,
  Claimed,
}

impl WorkerState {
  /// Apply `event`, rejecting transitions the lifecycle does not allow.
  pub fn transition(self, event: LifecycleEvent) -> Result<WorkerState> {
    use LifecycleEvent::*;
    use WorkerState::*;

    match (self, event) {
      (Parsed, Install) => Ok(Installing),
      (Installing, InstallSucceeded) => Ok(Installed),
      (Installing, InstallFailed) => Ok(Redundant),
      (Installed, Activate) => Ok(Activating),
      (Activating, Claimed) => Ok(Activated),
      (state, event) => Err(eyre!("Invalid lifecycle transition: {:?} on {}", event, state)),
    }
  }

  /// Whether requests should be routed through the caches.
  pub fn controls_clients(self) -> bool {
    self == WorkerState::Activated
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(name)
  }
}
