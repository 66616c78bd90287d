use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unacknowledged alert from `/api/alerts?ack=0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
  pub id: u64,
  #[serde(default)]
  pub machine_id: Option<u64>,
  /// Machine name
  #[serde(default)]
  pub machine: Option<String>,
  #[serde(default)]
  pub severity: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub raised_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
  pub id: u64,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "type", default)]
  pub machine_type: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub efficiency: Option<f64>,
  #[serde(default)]
  pub last_seen: Option<String>,
}

impl Machine {
  /// Lowercased text used by the search filter
  pub fn search_text(&self) -> String {
    [
      Some(self.name.as_str()),
      self.machine_type.as_deref(),
      self.location.as_deref(),
      self.status.as_deref(),
    ]
    .iter()
    .flatten()
    .copied()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
  pub sensor_name: String,
  #[serde(default)]
  pub value: Option<f64>,
  #[serde(default)]
  pub unit: Option<String>,
  #[serde(default)]
  pub recorded_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePoint {
  pub metric_date: String,
  #[serde(default)]
  pub efficiency: Option<f64>,
  #[serde(default)]
  pub uptime: Option<f64>,
}

/// `/api/machines/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineDetail {
  #[serde(default)]
  pub id: Option<u64>,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "type", default)]
  pub machine_type: Option<String>,
  #[serde(default)]
  pub location: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub efficiency: Option<f64>,
  #[serde(default)]
  pub last_seen: Option<String>,
  #[serde(default)]
  pub sensors: Vec<SensorReading>,
  #[serde(default)]
  pub sensor_stats: Vec<serde_json::Value>,
  /// Newest first
  #[serde(default, alias = "recent_performance")]
  pub performance: Vec<PerformancePoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceTask {
  #[serde(default)]
  pub id: Option<u64>,
  #[serde(default)]
  pub machine_id: Option<u64>,
  #[serde(default)]
  pub machine: Option<String>,
  #[serde(default)]
  pub description: Option<String>,
  #[serde(default)]
  pub technician: Option<String>,
  #[serde(default)]
  pub priority: Option<String>,
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub scheduled_date: Option<String>,
  #[serde(default)]
  pub created_at: Option<String>,
}

/// Body of `POST /api/maintenance`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
  pub machine_id: Option<u64>,
  pub description: String,
  pub technician: String,
  pub scheduled_date: Option<String>,
  pub priority: String,
}

impl NewTask {
  pub fn new(
    machine_id: Option<u64>,
    description: impl Into<String>,
    technician: impl Into<String>,
    scheduled_date: Option<String>,
  ) -> Self {
    Self {
      machine_id,
      description: description.into(),
      technician: technician.into(),
      scheduled_date,
      priority: "medium".to_string(),
    }
  }
}

/// Body of `POST /api/machines`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMachine {
  pub name: String,
  #[serde(rename = "type")]
  pub machine_type: String,
  pub location: String,
  pub rated_capacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
  #[serde(alias = "metric_date")]
  pub date: String,
  #[serde(alias = "efficiency")]
  pub value: f64,
}

/// KPI rollup from `/api/summary`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
  #[serde(default)]
  pub total_machines: Option<u64>,
  #[serde(default)]
  pub avg_efficiency: Option<f64>,
  #[serde(default)]
  pub active_alerts: Option<u64>,
  #[serde(default)]
  pub performance_trend: Vec<TrendPoint>,
  #[serde(default, alias = "status_counts")]
  pub status_distribution: BTreeMap<String, u64>,
}

/// Reply to a mutation. The backend answers with either `ok` or `success`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MutationReply {
  #[serde(default)]
  pub ok: Option<bool>,
  #[serde(default)]
  pub success: Option<bool>,
  #[serde(default)]
  pub error: Option<String>,
}

impl MutationReply {
  /// An explicit `ok`/`success` flag wins. Replies without one (a created row,
  /// an empty object) succeed unless they carry an error message.
  pub fn succeeded(&self) -> bool {
    self.ok.or(self.success).unwrap_or(self.error.is_none())
  }
}

/// Reply to `POST /api/upload-csv`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResult {
  #[serde(default)]
  pub success: bool,
  #[serde(default)]
  pub data: Option<serde_json::Value>,
  #[serde(default)]
  pub error: Option<String>,
}

/// Editable record tables under `/api/data/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTable {
  Machines,
  Sensors,
}

impl RecordTable {
  pub fn as_str(&self) -> &'static str {
    match self {
      RecordTable::Machines => "machines",
      RecordTable::Sensors => "sensors",
    }
  }

  /// Fields the records view lets the user edit
  pub fn editable_fields(&self) -> &'static [&'static str] {
    match self {
      RecordTable::Machines => &["name", "type", "location", "status"],
      RecordTable::Sensors => &["value", "timestamp"],
    }
  }
}

/// One row of a record table.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_summary_accepts_backend_aliases() {
    let summary: Summary = serde_json::from_str(
      r#"{"total_machines":12,"avg_efficiency":71.4,"active_alerts":3,
          "status_counts":{"running":9,"idle":3},"machines":[]}"#,
    )
    .unwrap();
    assert_eq!(summary.total_machines, Some(12));
    assert_eq!(summary.status_distribution["running"], 9);
    assert!(summary.performance_trend.is_empty());
  }

  #[test]
  fn test_machine_detail_recent_performance() {
    let detail: MachineDetail = serde_json::from_str(
      r#"{"name":"Press 1","type":"press","sensors":[{"sensor_name":"temp","value":71.2,"unit":"C"}],
          "recent_performance":[{"metric_date":"2024-05-01","efficiency":88.0,"uptime":97.5}]}"#,
    )
    .unwrap();
    assert_eq!(detail.machine_type.as_deref(), Some("press"));
    assert_eq!(detail.sensors[0].value, Some(71.2));
    assert_eq!(detail.performance[0].uptime, Some(97.5));
  }

  #[test]
  fn test_mutation_reply_shapes() {
    let ok: MutationReply = serde_json::from_str(r#"{"ok":true}"#).unwrap();
    let success: MutationReply = serde_json::from_str(r#"{"success":true}"#).unwrap();
    let failed: MutationReply = serde_json::from_str(r#"{"success":false,"error":"nope"}"#).unwrap();
    assert!(ok.succeeded());
    assert!(success.succeeded());
    assert!(!failed.succeeded());

    let created: MutationReply = serde_json::from_str(r#"{"id":12,"name":"Press 4"}"#).unwrap();
    let only_error: MutationReply = serde_json::from_str(r#"{"error":"duplicate"}"#).unwrap();
    assert!(created.succeeded());
    assert!(MutationReply::default().succeeded());
    assert!(!only_error.succeeded());
  }

  #[test]
  fn test_new_task_defaults_to_medium_priority() {
    let task = NewTask::new(Some(4), "Replace belt", "Ana", None);
    let json = serde_json::to_value(&task).unwrap();
    assert_eq!(json["priority"], "medium");
    assert_eq!(json["scheduled_date"], serde_json::Value::Null);
  }

  #[test]
  fn test_machine_search_text() {
    let machine: Machine = serde_json::from_str(
      r#"{"id":1,"name":"Lathe A","type":"CNC","location":"Plant B","status":"running"}"#,
    )
    .unwrap();
    assert_eq!(machine.search_text(), "lathe a cnc plant b running");
  }
}
