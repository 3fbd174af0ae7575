//! Engine configuration.
//!
//! Zone sizes are counted in cells of the zone's element type: words for the
//! heap and det stack, frames for the nondet stack, entries for the trail.
//!
//! Configuration can be built in code, starting from `EngineConfig::default()`,
//! or loaded from TOML:
//!
//! ```toml
//! heap_size = 65536
//! nondet_stack_size = 4096
//! profile_time = true
//! ```

use std::fmt;

use serde::Deserialize;

/// Configuration for an engine and its initial context
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Heap size in words
    pub heap_size: usize,
    /// Heap red zone size in words
    pub heap_redzone: usize,
    /// Det stack size in words
    pub det_stack_size: usize,
    /// Det stack red zone size in words
    pub det_stack_redzone: usize,
    /// Nondet stack size in frames
    pub nondet_stack_size: usize,
    /// Nondet stack red zone size in frames
    pub nondet_stack_redzone: usize,
    /// Trail size in entries
    pub trail_size: usize,
    /// Trail red zone size in entries
    pub trail_redzone: usize,
    /// Alignment requested for every zone
    pub zone_alignment: usize,
    /// Name given to the engine's initial context
    pub context_name: String,
    /// Track the currently executing procedure for time profiling
    pub profile_time: bool,
    /// Count caller/callee pairs when host code re-enters guest code
    pub profile_calls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heap_size: 262_144,
            heap_redzone: 1024,
            det_stack_size: 65_536,
            det_stack_redzone: 256,
            nondet_stack_size: 16_384,
            nondet_stack_redzone: 64,
            trail_size: 65_536,
            trail_redzone: 256,
            zone_alignment: 8,
            context_name: "main".to_string(),
            profile_time: false,
            profile_calls: false,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Small zones, for tests and short-lived engines.
    pub fn small() -> Self {
        Self {
            heap_size: 4096,
            heap_redzone: 64,
            det_stack_size: 1024,
            det_stack_redzone: 32,
            nondet_stack_size: 256,
            nondet_stack_redzone: 8,
            trail_size: 1024,
            trail_redzone: 32,
            ..Self::default()
        }
    }

    /// Enable time profiling and call-pair counting
    pub fn with_profiling(mut self) -> Self {
        self.profile_time = true;
        self.profile_calls = true;
        self
    }

    pub fn with_context_name(mut self, name: impl Into<String>) -> Self {
        self.context_name = name.into();
        self
    }

    /// Check that every zone leaves room outside its red zone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zones = [
            ("heap", self.heap_size, self.heap_redzone),
            ("det stack", self.det_stack_size, self.det_stack_redzone),
            ("nondet stack", self.nondet_stack_size, self.nondet_stack_redzone),
            ("trail", self.trail_size, self.trail_redzone),
        ];
        for (zone, size, redzone) in zones {
            if size == 0 || redzone >= size {
                return Err(ConfigError::ZoneSize { zone, size, redzone });
            }
        }
        // The nondet stack always holds the context's bottom frame.
        if self.nondet_stack_size - self.nondet_stack_redzone < 2 {
            return Err(ConfigError::ZoneSize {
                zone: "nondet stack",
                size: self.nondet_stack_size,
                redzone: self.nondet_stack_redzone,
            });
        }
        if !self.zone_alignment.is_power_of_two() {
            return Err(ConfigError::Alignment(self.zone_alignment));
        }
        Ok(())
    }
}

/// Errors in engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// TOML could not be parsed into an `EngineConfig`
    Parse(String),
    /// A zone is empty or entirely red zone
    ZoneSize { zone: &'static str, size: usize, redzone: usize },
    /// Zone alignment is not a power of two
    Alignment(usize),
    /// Unknown name in a debug flag list
    UnknownDebugFlag(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::ZoneSize { zone, size, redzone } => write!(
                f,
                "Invalid {} size: {} cells with a {} cell red zone",
                zone, size, redzone
            ),
            Self::Alignment(a) => write!(f, "Zone alignment {} is not a power of two", a),
            Self::UnknownDebugFlag(name) => write!(f, "Unknown debug flag: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {}
