//! Loading simulation scenarios from disk.
//!
//! Two file kinds, mirroring the teacher's split between a small TOML run
//! config and a larger JSON scene description: a `RunConfig` (numerology,
//! RNG seed, window size — the knobs you'd tweak between runs) and a
//! `ScenarioFile` (the basestation/slice/user topology, serialized as
//! JSON). Library-internal code returns `Result<T, SimError>`; this module
//! is the one place `anyhow::Context` appears, wrapping I/O/parse failures
//! before they're mapped into a `SimError::Config`.

use crate::error::SimError;
use crate::scheduler::InterScheduler;
use crate::simulation::{Numerology, Simulation};
use crate::slice::SliceConfiguration;
use anyhow::Context;
use log::{info, warn};
use serde::Deserialize;
use std::path::Path;

/// The run-level knobs, loaded from a TOML file alongside the scenario.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    pub option_5g: u8,
    pub rbs_per_rbg: usize,
    pub seed: u64,
    pub window_max: usize,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read run config at {}", path.display()))
            .map_err(|e| SimError::Config(e.to_string()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse run config at {}", path.display()))
            .map_err(|e| SimError::Config(e.to_string()))
    }
}

/// One basestation's worth of topology: a display name, RBG count, and its
/// slices. Deserialized straight from the scenario file's JSON array.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseStationScenario {
    pub display_name: String,
    pub n_rbgs: usize,
    pub slices: Vec<SliceConfiguration>,
}

/// The root scenario document: every basestation to construct.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioFile {
    pub basestations: Vec<BaseStationScenario>,
}

impl ScenarioFile {
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario file at {}", path.display()))
            .map_err(|e| SimError::Config(e.to_string()))?;
        let scenario: ScenarioFile = serde_json::from_str(&data)
            .context("invalid scenario JSON")
            .map_err(|e| SimError::Config(e.to_string()))?;
        if scenario.basestations.is_empty() {
            warn!("rejecting scenario file at {}: no basestations defined", path.display());
            return Err(SimError::Config("scenario must define at least one basestation".to_string()));
        }
        Ok(scenario)
    }
}

/// Build a fully-wired `Simulation` from a run config and a scenario file,
/// assigning Round-Robin as every basestation's inter-scheduler — callers
/// needing `OptimalHeuristic` or `Sac` construct the `Simulation`
/// programmatically instead, since a trained policy can't be named in a
/// config file.
pub fn build_simulation(run_config: &RunConfig, scenario: &ScenarioFile) -> Result<Simulation, SimError> {
    let numerology = Numerology { option_5g: run_config.option_5g, rbs_per_rbg: run_config.rbs_per_rbg };
    let mut sim = Simulation::new(numerology)?;
    for bs in &scenario.basestations {
        sim.add_basestation(
            bs.display_name.clone(),
            bs.n_rbgs,
            run_config.seed,
            run_config.window_max,
            InterScheduler::round_robin(),
            bs.slices.clone(),
        )?;
    }
    info!("built simulation with {} basestations from scenario file", scenario.basestations.len());
    Ok(sim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("slice_sched_sim_test_{}_{}", std::process::id(), name));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn run_config_loads_from_toml() {
        let path = write_tmp(
            "run_config.toml",
            "option-5g = 0\nrbs-per-rbg = 2\nseed = 7\nwindow-max = 50\n",
        );
        let cfg = RunConfig::load(&path).unwrap();
        assert_eq!(cfg.option_5g, 0);
        assert_eq!(cfg.rbs_per_rbg, 2);
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.window_max, 50);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn scenario_rejects_empty_basestation_list() {
        let path = write_tmp("empty_scenario.json", r#"{"basestations": []}"#);
        let err = ScenarioFile::load(&path).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = RunConfig::load(Path::new("/nonexistent/path/run_config.toml")).unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }
}
