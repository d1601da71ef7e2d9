//! Configuration system for the emulator.
//!
//! This module defines all configuration structures used to parameterize the
//! emulated machine. It provides:
//! 1. **Defaults:** Baseline constants for the window, cache, and predictors.
//! 2. **Structures:** Hierarchical config for the engine, cache, predictors,
//!    and side-channel mitigations.
//! 3. **Loading:** Deserialization from YAML (`config.yml`) or
//!    `Config::default()` when no file is given.

use serde::Deserialize;

/// Default configuration constants.
///
/// These values define the machine when not explicitly overridden in the
/// YAML configuration file.
mod defaults {
    /// Reorder buffer depth (in-flight instruction window).
    pub const ROB_DEPTH: usize = 32;

    /// Load-store queue depth.
    pub const LSQ_DEPTH: usize = 16;

    /// Instructions retired per cycle.
    pub const RETIRE_WIDTH: usize = 2;

    /// Fetch queue capacity between fetch and dispatch.
    pub const FETCH_QUEUE: usize = 8;

    /// Initial stack pointer. Just below the inaccessible half of the
    /// address space, 16-byte aligned.
    pub const INITIAL_SP: u32 = 0x7fff_fff0;

    /// Number of cache sets.
    pub const CACHE_SETS: usize = 4;

    /// Cache associativity (ways per set).
    pub const CACHE_WAYS: usize = 4;

    /// Cache line size in bytes.
    pub const CACHE_LINE: usize = 16;

    /// Cycles before a cache hit returns its value.
    pub const HIT_CYCLES: u64 = 2;

    /// Cycles before a cache miss returns its value.
    pub const MISS_CYCLES: u64 = 5;

    /// Cycles between a memory access returning its value and signaling
    /// whether it faults. A nonzero value keeps the dependents of a faulting
    /// load running for a while before the fault is raised.
    pub const FAULT_CYCLES: u64 = 3;

    /// Branch direction table index width (log2 of the counter count).
    pub const INDEX_BITS: usize = 4;

    /// Initial value of each 2-bit direction counter (2 = weakly taken).
    pub const INIT_COUNTER: u8 = 2;

    /// Branch target buffer index width (log2 of the entry count).
    pub const BTB_INDEX_BITS: usize = 4;

    /// Return address stack depth.
    pub const RAS_DEPTH: usize = 16;
}

/// Root configuration structure.
///
/// # Examples
///
/// ```
/// use teem_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.engine.rob_depth, 32);
/// assert_eq!(config.cache.sets, 4);
///
/// let config: Config = Config::from_yaml("engine:\n  rob_depth: 8\n").unwrap();
/// assert_eq!(config.engine.rob_depth, 8);
/// assert_eq!(config.cache.ways, 4);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Instruction window and retire parameters.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Data cache geometry and timing.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Branch, target, and return predictors.
    #[serde(default)]
    pub predictor: PredictorConfig,
    /// Side-channel mitigations.
    #[serde(default)]
    pub mitigations: MitigationConfig,
}

impl Config {
    /// Parses a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// Instruction window and retire configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Reorder buffer depth (also the tag pool size)
    #[serde(default = "EngineConfig::default_rob_depth")]
    pub rob_depth: usize,

    /// Load-store queue depth
    #[serde(default = "EngineConfig::default_lsq_depth")]
    pub lsq_depth: usize,

    /// Instructions retired per cycle
    #[serde(default = "EngineConfig::default_retire_width")]
    pub retire_width: usize,

    /// Fetch queue capacity
    #[serde(default = "EngineConfig::default_fetch_queue")]
    pub fetch_queue: usize,

    /// Initial stack pointer placed in `sp` at program load
    #[serde(default = "EngineConfig::default_initial_sp")]
    pub initial_sp: u32,
}

impl EngineConfig {
    fn default_rob_depth() -> usize {
        defaults::ROB_DEPTH
    }

    fn default_lsq_depth() -> usize {
        defaults::LSQ_DEPTH
    }

    fn default_retire_width() -> usize {
        defaults::RETIRE_WIDTH
    }

    fn default_fetch_queue() -> usize {
        defaults::FETCH_QUEUE
    }

    fn default_initial_sp() -> u32 {
        defaults::INITIAL_SP
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rob_depth: defaults::ROB_DEPTH,
            lsq_depth: defaults::LSQ_DEPTH,
            retire_width: defaults::RETIRE_WIDTH,
            fetch_queue: defaults::FETCH_QUEUE,
            initial_sp: defaults::INITIAL_SP,
        }
    }
}

/// Data cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Number of sets
    #[serde(default = "CacheConfig::default_sets")]
    pub sets: usize,

    /// Associativity (ways per set)
    #[serde(default = "CacheConfig::default_ways")]
    pub ways: usize,

    /// Line size in bytes
    #[serde(default = "CacheConfig::default_line_size")]
    pub line_size: usize,

    /// Cycles before a hit returns its value
    #[serde(default = "CacheConfig::default_hit_cycles")]
    pub hit_cycles: u64,

    /// Cycles before a miss returns its value
    #[serde(default = "CacheConfig::default_miss_cycles")]
    pub miss_cycles: u64,

    /// Cycles between value return and fault signal
    #[serde(default = "CacheConfig::default_fault_cycles")]
    pub fault_cycles: u64,
}

impl CacheConfig {
    fn default_sets() -> usize {
        defaults::CACHE_SETS
    }

    fn default_ways() -> usize {
        defaults::CACHE_WAYS
    }

    fn default_line_size() -> usize {
        defaults::CACHE_LINE
    }

    fn default_hit_cycles() -> u64 {
        defaults::HIT_CYCLES
    }

    fn default_miss_cycles() -> u64 {
        defaults::MISS_CYCLES
    }

    fn default_fault_cycles() -> u64 {
        defaults::FAULT_CYCLES
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sets: defaults::CACHE_SETS,
            ways: defaults::CACHE_WAYS,
            line_size: defaults::CACHE_LINE,
            hit_cycles: defaults::HIT_CYCLES,
            miss_cycles: defaults::MISS_CYCLES,
            fault_cycles: defaults::FAULT_CYCLES,
        }
    }
}

/// Predictor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorConfig {
    /// Direction table index width (log2 of the counter count)
    #[serde(default = "PredictorConfig::default_index_bits")]
    pub index_bits: usize,

    /// Initial 2-bit counter value (0..=3)
    #[serde(default = "PredictorConfig::default_init_counter")]
    pub init_counter: u8,

    /// Use a single global counter instead of a per-PC table
    #[serde(default)]
    pub simple: bool,

    /// Branch target buffer index width (log2 of the entry count)
    #[serde(default = "PredictorConfig::default_btb_index_bits")]
    pub btb_index_bits: usize,

    /// Return address stack depth
    #[serde(default = "PredictorConfig::default_ras_depth")]
    pub ras_depth: usize,
}

impl PredictorConfig {
    fn default_index_bits() -> usize {
        defaults::INDEX_BITS
    }

    fn default_init_counter() -> u8 {
        defaults::INIT_COUNTER
    }

    fn default_btb_index_bits() -> usize {
        defaults::BTB_INDEX_BITS
    }

    fn default_ras_depth() -> usize {
        defaults::RAS_DEPTH
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            index_bits: defaults::INDEX_BITS,
            init_counter: defaults::INIT_COUNTER,
            simple: false,
            btb_index_bits: defaults::BTB_INDEX_BITS,
            ras_depth: defaults::RAS_DEPTH,
        }
    }
}

/// Side-channel mitigation switches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MitigationConfig {
    /// Quietly return zero from loads that will fault, instead of the real
    /// data. The cache line is still filled; the mitigation only denies the
    /// transient window the loaded value.
    #[serde(default)]
    pub suppress_faulting_loads: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.engine.rob_depth, 32);
        assert_eq!(c.engine.retire_width, 2);
        assert_eq!(c.cache.sets, 4);
        assert_eq!(c.cache.ways, 4);
        assert_eq!(c.cache.line_size, 16);
        assert_eq!(c.predictor.ras_depth, 16);
        assert!(!c.mitigations.suppress_faulting_loads);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let c = Config::from_yaml(
            "cache:\n  sets: 8\n  miss_cycles: 9\nmitigations:\n  suppress_faulting_loads: true\n",
        )
        .unwrap();
        assert_eq!(c.cache.sets, 8);
        assert_eq!(c.cache.miss_cycles, 9);
        assert_eq!(c.cache.ways, 4);
        assert!(c.mitigations.suppress_faulting_loads);
        assert_eq!(c.engine.rob_depth, 32);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let c = Config::from_yaml("{}").unwrap();
        assert_eq!(c.engine.rob_depth, Config::default().engine.rob_depth);
    }
}
