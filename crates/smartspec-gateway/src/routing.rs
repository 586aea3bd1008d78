//! Task-class routing table.
//!
//! Rows are `(task, priority) -> [targets]`. Selection walks a row's
//! targets in order, skipping disabled providers; the first target is the
//! primary, the rest are fallbacks taken on provider failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use smartspec_config::{Config, RouteTarget};

/// Task classes the gateway routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskClass {
    Chat,
    CodeGeneration,
    Reasoning,
    Summarization,
    Classification,
}

impl TaskClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::CodeGeneration => "code-generation",
            Self::Reasoning => "reasoning",
            Self::Summarization => "summarization",
            Self::Classification => "classification",
        }
    }
}

impl fmt::Display for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "code-generation" => Ok(Self::CodeGeneration),
            "reasoning" => Ok(Self::Reasoning),
            "summarization" => Ok(Self::Summarization),
            "classification" => Ok(Self::Classification),
            other => Err(format!("unknown task class '{other}'")),
        }
    }
}

/// Budget priority for selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPriority {
    Quality,
    Cost,
    Speed,
}

impl BudgetPriority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Cost => "cost",
            Self::Speed => "speed",
        }
    }
}

impl fmt::Display for BudgetPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quality" => Ok(Self::Quality),
            "cost" => Ok(Self::Cost),
            "speed" => Ok(Self::Speed),
            other => Err(format!("unknown budget priority '{other}'")),
        }
    }
}

/// The routing table, resolved from configuration at construction.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
struct Row {
    task: String,
    priority: String,
    targets: Vec<RouteTarget>,
}

impl RoutingTable {
    /// Build from validated configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let rows = config
            .routing
            .iter()
            .map(|rule| Row {
                task: rule.task.clone(),
                priority: rule.priority.clone(),
                targets: rule.routes.clone(),
            })
            .collect();
        Self { rows }
    }

    /// Targets for `(task, priority)`, falling back to the task's first row
    /// when the exact priority has none, in table order.
    #[must_use]
    pub fn targets(&self, task: TaskClass, priority: BudgetPriority) -> Vec<RouteTarget> {
        let exact: Vec<RouteTarget> = self
            .rows
            .iter()
            .filter(|r| r.task == task.as_str() && r.priority == priority.as_str())
            .flat_map(|r| r.targets.iter().cloned())
            .collect();
        if !exact.is_empty() {
            return exact;
        }
        self.rows
            .iter()
            .filter(|r| r.task == task.as_str())
            .flat_map(|r| r.targets.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        toml::from_str(
            r#"
            [providers.anthropic]
            kind = "anthropic"
            [providers.cheap]
            kind = "openrouter"

            [[routing]]
            task = "code-generation"
            priority = "quality"
            routes = [
                { provider = "anthropic", model = "claude-sonnet-4-5", price_in_per_1k = 0.003, price_out_per_1k = 0.015 },
                { provider = "cheap", model = "qwen/qwen3-coder", price_in_per_1k = 0.0002, price_out_per_1k = 0.0008 },
            ]

            [[routing]]
            task = "code-generation"
            priority = "cost"
            routes = [
                { provider = "cheap", model = "qwen/qwen3-coder", price_in_per_1k = 0.0002, price_out_per_1k = 0.0008 },
            ]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn exact_priority_row_wins() {
        let table = RoutingTable::from_config(&config());
        let targets = table.targets(TaskClass::CodeGeneration, BudgetPriority::Cost);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].provider, "cheap");
    }

    #[test]
    fn missing_priority_falls_back_to_task_rows() {
        let table = RoutingTable::from_config(&config());
        let targets = table.targets(TaskClass::CodeGeneration, BudgetPriority::Speed);
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[0].provider, "anthropic");
    }

    #[test]
    fn unknown_task_has_no_targets() {
        let table = RoutingTable::from_config(&config());
        assert!(table.targets(TaskClass::Chat, BudgetPriority::Quality).is_empty());
    }

    #[test]
    fn task_and_priority_parse_round_trip() {
        for task in ["chat", "code-generation", "reasoning", "summarization"] {
            assert_eq!(task.parse::<TaskClass>().unwrap().as_str(), task);
        }
        for p in ["quality", "cost", "speed"] {
            assert_eq!(p.parse::<BudgetPriority>().unwrap().as_str(), p);
        }
        assert!("premium".parse::<BudgetPriority>().is_err());
    }
}
