//! Persisted autopilot state and the pure rules around it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::WisdomMemory;

/// Phases the autopilot cycles through, one per created task.
pub const PHASES: [&str; 6] = ["decompose", "analyze", "rebuild", "evolve", "verify", "operate"];

/// Seed used when the operator starts the autopilot without one.
pub const DEFAULT_SEED: &str = "improve existing code";

/// Lower bound for the tick period.
pub const MIN_TICK_MS: u64 = 2000;

const DEFAULT_TARGET_Y: u32 = 3;
const DEFAULT_MAX_ACTIVE: usize = 2;
const DEFAULT_TICK_MS: u64 = 8000;
const DEFAULT_THRESHOLD: f64 = 93.0;

/// Autopilot state as stored in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorState {
    pub enabled: bool,
    pub infinite: bool,
    pub target_y: u32,
    pub seed_prompt: String,
    /// Empty means the default provider.
    pub provider: String,
    /// Empty means the provider default.
    pub model: String,
    pub max_active: usize,
    pub tick_ms: u64,
    pub auto_approve_threshold: f64,
    pub total_created: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub status_message: String,
    pub goal_y: usize,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            enabled: false,
            infinite: false,
            target_y: DEFAULT_TARGET_Y,
            seed_prompt: String::new(),
            provider: String::new(),
            model: String::new(),
            max_active: DEFAULT_MAX_ACTIVE,
            tick_ms: DEFAULT_TICK_MS,
            auto_approve_threshold: DEFAULT_THRESHOLD,
            total_created: 0,
            last_tick_at: None,
            status_message: "stopped".to_string(),
            goal_y: 0,
        }
    }
}

/// Operator request to start the autopilot. Missing fields take defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutopilotConfig {
    pub seed_prompt: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub target_y: Option<u32>,
    pub infinite: bool,
    pub max_active: Option<usize>,
    pub tick_ms: Option<u64>,
    pub auto_approve_threshold: Option<f64>,
}

impl AutopilotConfig {
    pub fn new(seed_prompt: impl Into<String>) -> Self {
        Self {
            seed_prompt: seed_prompt.into(),
            ..Self::default()
        }
    }
}

/// Phase name for the `cycle`-th created task (1-based).
pub fn phase_for_cycle(cycle: u64) -> &'static str {
    let index = (cycle.saturating_sub(1) % PHASES.len() as u64) as usize;
    PHASES[index]
}

impl OrchestratorState {
    /// Apply a clamped start request and enable the autopilot.
    ///
    /// `stream_len` is the approved stream size at start; the goal is that
    /// many entries plus `target_y`.
    pub fn apply_start(&mut self, config: AutopilotConfig, stream_len: usize, default_provider: &str) {
        let seed = config.seed_prompt.trim();
        self.seed_prompt = if seed.is_empty() {
            DEFAULT_SEED.to_string()
        } else {
            seed.to_string()
        };
        self.provider = config
            .provider
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| default_provider.to_string());
        self.model = config.model.unwrap_or_default();
        self.target_y = config.target_y.unwrap_or(DEFAULT_TARGET_Y).max(1);
        self.infinite = config.infinite;
        self.max_active = config.max_active.unwrap_or(DEFAULT_MAX_ACTIVE).max(1);
        self.tick_ms = config.tick_ms.unwrap_or(DEFAULT_TICK_MS).max(MIN_TICK_MS);
        self.auto_approve_threshold = config
            .auto_approve_threshold
            .unwrap_or(DEFAULT_THRESHOLD)
            .clamp(1.0, 100.0);
        self.goal_y = stream_len + self.target_y as usize;
        self.enabled = true;
        self.status_message = "started".to_string();
    }

    /// Tick period, never below [`MIN_TICK_MS`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(MIN_TICK_MS))
    }

    /// Goal check for bounded runs.
    pub fn goal_reached(&self, stream_len: usize) -> bool {
        !self.infinite && stream_len >= self.goal_y
    }

    /// Requirement text for the next autopilot task.
    pub fn next_prompt(&self, wisdom: &WisdomMemory, window: usize) -> String {
        let cycle = self.total_created + 1;
        let recent = wisdom.recent(window);
        let constraints = if recent.is_empty() {
            "none".to_string()
        } else {
            recent.join(" / ")
        };
        format!(
            "{}\n\nCycle {}: {} phase.\nRequirements: minimal feature + improvement proposals + verification steps.\nPast constraints: {}",
            self.seed_prompt,
            cycle,
            phase_for_cycle(cycle),
            constraints
        )
    }

    /// Model override, `None` when empty.
    pub fn model_override(&self) -> Option<String> {
        (!self.model.trim().is_empty()).then(|| self.model.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = OrchestratorState::default();
        assert!(!state.enabled);
        assert_eq!(state.target_y, 3);
        assert_eq!(state.max_active, 2);
        assert_eq!(state.tick_ms, 8000);
        assert_eq!(state.auto_approve_threshold, 93.0);
        assert_eq!(state.last_tick_at, None);
    }

    #[test]
    fn test_partial_document_takes_defaults() {
        let state: OrchestratorState =
            serde_json::from_str(r#"{"enabled":true,"tickMs":500}"#).unwrap();
        assert!(state.enabled);
        assert_eq!(state.tick_ms, 500);
        assert_eq!(state.tick_interval(), Duration::from_millis(MIN_TICK_MS));
        assert_eq!(state.max_active, 2);
    }

    #[test]
    fn test_apply_start_clamps() {
        let mut state = OrchestratorState::default();
        let config = AutopilotConfig {
            seed_prompt: "   ".into(),
            target_y: Some(0),
            max_active: Some(0),
            tick_ms: Some(10),
            auto_approve_threshold: Some(400.0),
            ..AutopilotConfig::default()
        };
        state.apply_start(config, 4, "gemini");

        assert!(state.enabled);
        assert_eq!(state.seed_prompt, DEFAULT_SEED);
        assert_eq!(state.provider, "gemini");
        assert_eq!(state.target_y, 1);
        assert_eq!(state.max_active, 1);
        assert_eq!(state.tick_ms, MIN_TICK_MS);
        assert_eq!(state.auto_approve_threshold, 100.0);
        assert_eq!(state.goal_y, 5);
    }

    #[test]
    fn test_goal_reached() {
        let mut state = OrchestratorState::default();
        state.apply_start(AutopilotConfig::new("seed"), 2, "openai");
        assert_eq!(state.goal_y, 5);
        assert!(!state.goal_reached(4));
        assert!(state.goal_reached(5));
        state.infinite = true;
        assert!(!state.goal_reached(50));
    }

    #[test]
    fn test_phase_rotation() {
        assert_eq!(phase_for_cycle(1), "decompose");
        assert_eq!(phase_for_cycle(6), "operate");
        assert_eq!(phase_for_cycle(7), "decompose");
    }

    #[test]
    fn test_next_prompt() {
        let mut state = OrchestratorState::default();
        state.seed_prompt = "todo app".into();
        state.total_created = 1;

        let empty = WisdomMemory::new();
        assert_eq!(
            state.next_prompt(&empty, 3),
            "todo app\n\nCycle 2: analyze phase.\nRequirements: minimal feature + improvement proposals + verification steps.\nPast constraints: none"
        );

        let wisdom = WisdomMemory::from(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ]);
        assert!(state.next_prompt(&wisdom, 3).ends_with("Past constraints: b / c / d"));
    }
}
