use std::time::Duration;

use crate::config::TtlConfig;

/// Local cache slots used by the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey {
  DashboardSummary,
  DashboardMachines,
  DashboardAlerts,
  DashboardMaintenance,
  /// Event timeline, kept without expiry
  DashboardTimeline,
  Machines,
  Alerts,
  Maintenance,
  Machine(u64),
}

impl CacheKey {
  pub fn key(&self) -> String {
    match self {
      CacheKey::DashboardSummary => "dh_summary".to_string(),
      CacheKey::DashboardMachines => "dh_machines".to_string(),
      CacheKey::DashboardAlerts => "dh_alerts".to_string(),
      CacheKey::DashboardMaintenance => "dh_maint".to_string(),
      CacheKey::DashboardTimeline => "dh_timeline".to_string(),
      CacheKey::Machines => "pj_machines".to_string(),
      CacheKey::Alerts => "pj_alerts".to_string(),
      CacheKey::Maintenance => "pj_maint".to_string(),
      CacheKey::Machine(id) => format!("imcs_machine_{}", id),
    }
  }

  pub fn ttl(&self, ttl: &TtlConfig) -> Duration {
    match self {
      CacheKey::DashboardSummary => ttl.summary(),
      CacheKey::DashboardMachines | CacheKey::Machines => ttl.machines(),
      CacheKey::DashboardAlerts | CacheKey::Alerts => ttl.alerts(),
      CacheKey::DashboardMaintenance | CacheKey::Maintenance => ttl.maintenance(),
      CacheKey::Machine(_) => ttl.machine_detail(),
      CacheKey::DashboardTimeline => Duration::MAX,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_and_ttls() {
    let ttl = TtlConfig::default();
    assert_eq!(CacheKey::DashboardMaintenance.key(), "dh_maint");
    assert_eq!(CacheKey::Machine(7).key(), "imcs_machine_7");
    assert_eq!(CacheKey::Alerts.ttl(&ttl), Duration::from_secs(60));
    assert_eq!(CacheKey::Machines.ttl(&ttl), Duration::from_secs(120));
    assert_eq!(CacheKey::Maintenance.ttl(&ttl), Duration::from_secs(300));
  }
}
