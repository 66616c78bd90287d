/// Command palette entries and autocomplete ranking

#[derive(Debug, Clone)]
pub struct Command {
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

pub const COMMANDS: &[Command] = &[
  Command {
    name: "dashboard",
    aliases: &["d", "dash", "home"],
    description: "KPIs, trends, insights and timeline",
  },
  Command {
    name: "machines",
    aliases: &["m", "machine"],
    description: "Machine list and details",
  },
  Command {
    name: "alerts",
    aliases: &["a", "alert"],
    description: "Unacknowledged alerts",
  },
  Command {
    name: "maintenance",
    aliases: &["mt", "maint", "tasks"],
    description: "Maintenance tasks",
  },
  Command {
    name: "datasets",
    aliases: &["ds", "data"],
    description: "Import, generate and explore datasets",
  },
  Command {
    name: "records",
    aliases: &["rec", "edit"],
    description: "Edit machine and sensor records",
  },
  Command {
    name: "quit",
    aliases: &["q", "exit"],
    description: "Exit imcs",
  },
];

/// Commands matching `input`, best match first.
///
/// Ranking: exact name, exact alias, name prefix, alias prefix, name
/// substring, alias substring.
pub fn get_suggestions(input: &str) -> Vec<&'static Command> {
  let input = input.trim().to_lowercase();
  if input.is_empty() {
    return COMMANDS.iter().collect();
  }

  let rank = |cmd: &Command| -> Option<u8> {
    let aliases = || cmd.aliases.iter();
    if cmd.name == input {
      Some(0)
    } else if aliases().any(|a| *a == input) {
      Some(1)
    } else if cmd.name.starts_with(&input) {
      Some(2)
    } else if aliases().any(|a| a.starts_with(&input)) {
      Some(3)
    } else if cmd.name.contains(&input) {
      Some(4)
    } else if aliases().any(|a| a.contains(&input)) {
      Some(5)
    } else {
      None
    }
  };

  let mut matches: Vec<(&'static Command, u8)> = COMMANDS
    .iter()
    .filter_map(|cmd| rank(cmd).map(|r| (cmd, r)))
    .collect();
  matches.sort_by_key(|(_, r)| *r);
  matches.into_iter().map(|(cmd, _)| cmd).collect()
}

/// Exact name or alias lookup
pub fn find(name: &str) -> Option<&'static Command> {
  let name = name.trim().to_lowercase();
  COMMANDS
    .iter()
    .find(|cmd| cmd.name == name || cmd.aliases.contains(&name.as_str()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_input_returns_all() {
    assert_eq!(get_suggestions("").len(), COMMANDS.len());
  }

  #[test]
  fn test_exact_and_alias_match() {
    assert_eq!(get_suggestions("alerts")[0].name, "alerts");
    assert_eq!(get_suggestions("mt")[0].name, "maintenance");
    assert_eq!(get_suggestions("ds")[0].name, "datasets");
  }

  #[test]
  fn test_prefix_beats_substring() {
    let names: Vec<&str> = get_suggestions("ma").iter().map(|c| c.name).collect();
    assert_eq!(&names[..2], &["machines", "maintenance"]);
  }

  #[test]
  fn test_substring_match() {
    assert_eq!(get_suggestions("board")[0].name, "dashboard");
    assert!(get_suggestions("zzz").is_empty());
  }

  #[test]
  fn test_find() {
    assert_eq!(find("Home").map(|c| c.name), Some("dashboard"));
    assert!(find("mach").is_none());
  }
}
