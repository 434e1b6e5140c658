use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Configuration problems found before any cluster call is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),
    #[error("replicas must be > 0 (got {0})")]
    Replicas(u32),
    #[error("pvc-size must be set")]
    MissingPvcSize,
    #[error("pvc-size is not a valid storage quantity: {0:?}")]
    InvalidPvcSize(String),
    #[error("pvc-poll-interval must be > 0 (got {0:?})")]
    PollInterval(Duration),
    #[error("delete-batch-size must be > 0 and <= replicas (got {batch_size}, replicas={replicas})")]
    BatchSize { batch_size: u32, replicas: u32 },
    #[error("delete-interval must be > 0 (got {0:?})")]
    DeleteInterval(Duration),
    #[error("{field} must be set")]
    MissingName { field: &'static str },
    #[error("no PVCs found to track deletion")]
    NoClaimsToTrack,
}

/// The scale-down shape selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioName {
    Burst,
    Staggered,
}

impl ScenarioName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioName::Burst => "burst",
            ScenarioName::Staggered => "staggered",
        }
    }
}

impl Display for ScenarioName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "burst" => Ok(ScenarioName::Burst),
            "staggered" => Ok(ScenarioName::Staggered),
            other => Err(ConfigError::UnknownScenario(other.to_string())),
        }
    }
}

/// A validated scenario, carrying the settings only the staggered scenario uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    Burst,
    Staggered { batch_size: u32, interval: Duration },
}

impl ScenarioKind {
    pub fn name(&self) -> ScenarioName {
        match self {
            ScenarioKind::Burst => ScenarioName::Burst,
            ScenarioKind::Staggered { .. } => ScenarioName::Staggered,
        }
    }
}

/// Unvalidated benchmark settings, as provided by the user.
#[derive(Debug, Clone)]
pub struct RunConfigInput {
    pub name: String,
    pub namespace: String,
    pub scenario: String,
    pub replicas: u32,
    pub pvc_size: String,
    pub delete_batch_size: u32,
    pub delete_interval: Duration,
    pub pvc_poll_interval: Duration,
}

/// Immutable, validated configuration for one benchmark run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    name: String,
    namespace: String,
    replicas: u32,
    pvc_size: String,
    scenario: ScenarioKind,
    pvc_poll_interval: Duration,
}

impl RunConfig {
    /// Validate the input. The batch size and delete interval are only checked for the staggered
    /// scenario.
    pub fn new(input: RunConfigInput) -> Result<Self, ConfigError> {
        let scenario_name: ScenarioName = input.scenario.parse()?;

        if input.replicas == 0 {
            return Err(ConfigError::Replicas(input.replicas));
        }
        if input.pvc_size.is_empty() {
            return Err(ConfigError::MissingPvcSize);
        }
        if !is_storage_quantity(&input.pvc_size) {
            return Err(ConfigError::InvalidPvcSize(input.pvc_size));
        }
        if input.pvc_poll_interval.is_zero() {
            return Err(ConfigError::PollInterval(input.pvc_poll_interval));
        }
        if input.name.is_empty() {
            return Err(ConfigError::MissingName { field: "name" });
        }
        if input.namespace.is_empty() {
            return Err(ConfigError::MissingName { field: "namespace" });
        }

        let scenario = match scenario_name {
            ScenarioName::Burst => ScenarioKind::Burst,
            ScenarioName::Staggered => {
                if input.delete_batch_size == 0 || input.delete_batch_size > input.replicas {
                    return Err(ConfigError::BatchSize {
                        batch_size: input.delete_batch_size,
                        replicas: input.replicas,
                    });
                }
                if input.delete_interval.is_zero() {
                    return Err(ConfigError::DeleteInterval(input.delete_interval));
                }
                ScenarioKind::Staggered {
                    batch_size: input.delete_batch_size,
                    interval: input.delete_interval,
                }
            }
        };

        Ok(Self {
            name: input.name,
            namespace: input.namespace,
            replicas: input.replicas,
            pvc_size: input.pvc_size,
            scenario,
            pvc_poll_interval: input.pvc_poll_interval,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn replicas(&self) -> u32 {
        self.replicas
    }

    pub fn pvc_size(&self) -> &str {
        &self.pvc_size
    }

    pub fn scenario(&self) -> ScenarioKind {
        self.scenario
    }

    pub fn pvc_poll_interval(&self) -> Duration {
        self.pvc_poll_interval
    }

    /// The selector that matches the claims created for this run's stateful set.
    pub fn label_selector(&self) -> String {
        format!("app={}", self.name)
    }
}

const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 9] = ["n", "u", "m", "", "k", "M", "G", "T", "P"];

/// Whether `value` is a Kubernetes resource quantity, such as `100Mi`, `1G`, `1.5Gi` or `1e9`.
pub fn is_storage_quantity(value: &str) -> bool {
    let unsigned = value.strip_prefix('+').unwrap_or(value);
    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_end);

    let valid_number = !number.is_empty()
        && number != "."
        && number.matches('.').count() <= 1
        && number.chars().any(|c| c.is_ascii_digit());
    if !valid_number {
        return false;
    }

    if BINARY_SUFFIXES.contains(&suffix) || DECIMAL_SUFFIXES.contains(&suffix) || suffix == "E" {
        return true;
    }

    match suffix.strip_prefix(['e', 'E']) {
        Some(exponent) => {
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(scenario: &str) -> RunConfigInput {
        RunConfigInput {
            name: "pvcbench-sts".to_string(),
            namespace: "pvcbench-test".to_string(),
            scenario: scenario.to_string(),
            replicas: 10,
            pvc_size: "100Mi".to_string(),
            delete_batch_size: 3,
            delete_interval: Duration::from_secs(5),
            pvc_poll_interval: Duration::from_millis(100),
        }
    }

    #[test]
    fn valid_configurations() {
        let burst = RunConfig::new(input("burst")).unwrap();
        assert_eq!(ScenarioKind::Burst, burst.scenario());
        assert_eq!("app=pvcbench-sts", burst.label_selector());

        let staggered = RunConfig::new(input("staggered")).unwrap();
        assert_eq!(
            ScenarioKind::Staggered {
                batch_size: 3,
                interval: Duration::from_secs(5)
            },
            staggered.scenario()
        );
    }

    #[test]
    fn burst_ignores_staggered_settings() {
        let mut burst = input("burst");
        burst.delete_batch_size = 0;
        burst.delete_interval = Duration::ZERO;

        assert!(RunConfig::new(burst).is_ok());
    }

    #[test]
    fn invalid_configurations() {
        let cases: Vec<(&str, fn(&mut RunConfigInput), ConfigError)> = vec![
            (
                "unknown scenario",
                |i: &mut RunConfigInput| i.scenario = "random".to_string(),
                ConfigError::UnknownScenario("random".to_string()),
            ),
            (
                "zero replicas",
                |i: &mut RunConfigInput| i.replicas = 0,
                ConfigError::Replicas(0),
            ),
            (
                "empty pvc size",
                |i: &mut RunConfigInput| i.pvc_size = String::new(),
                ConfigError::MissingPvcSize,
            ),
            (
                "malformed pvc size",
                |i: &mut RunConfigInput| i.pvc_size = "lots".to_string(),
                ConfigError::InvalidPvcSize("lots".to_string()),
            ),
            (
                "zero poll interval",
                |i: &mut RunConfigInput| i.pvc_poll_interval = Duration::ZERO,
                ConfigError::PollInterval(Duration::ZERO),
            ),
            (
                "zero batch size",
                |i: &mut RunConfigInput| {
                    i.scenario = "staggered".to_string();
                    i.delete_batch_size = 0;
                },
                ConfigError::BatchSize {
                    batch_size: 0,
                    replicas: 10,
                },
            ),
            (
                "batch larger than replicas",
                |i: &mut RunConfigInput| {
                    i.scenario = "staggered".to_string();
                    i.delete_batch_size = 11;
                },
                ConfigError::BatchSize {
                    batch_size: 11,
                    replicas: 10,
                },
            ),
            (
                "zero delete interval",
                |i: &mut RunConfigInput| {
                    i.scenario = "staggered".to_string();
                    i.delete_interval = Duration::ZERO;
                },
                ConfigError::DeleteInterval(Duration::ZERO),
            ),
        ];

        for (name, modify, expected) in cases {
            let mut i = input("burst");
            modify(&mut i);
            assert_eq!(Err(expected), RunConfig::new(i), "{name}");
        }
    }

    #[test]
    fn storage_quantities() {
        for valid in ["100Mi", "1Gi", "1.5Gi", "500M", "1000", "1e9", "2E3", "+10Ki", "128k"] {
            assert!(is_storage_quantity(valid), "{valid}");
        }
        for invalid in ["", "Mi", "10XB", "1.2.3Gi", "-5Gi", "10 Mi", "1e", "."] {
            assert!(!is_storage_quantity(invalid), "{invalid}");
        }
    }
}
