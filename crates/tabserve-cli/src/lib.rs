//! tabserve CLI library - testable functions and modules
//!
//! The HTTP surface, authentication and configuration used by the
//! `tabserve` binary.

pub mod api;
pub mod auth;
pub mod config;

use anyhow::{Context, Result};
use tabserve_core::{ArtifactPaths, Classifier, ServingState};

/// Load and validate the artifacts without starting a server
pub fn check_artifacts(paths: &ArtifactPaths) -> Result<ServingState> {
    let state = ServingState::load(paths).context("failed to load model artifacts")?;
    println!(
        "Artifacts OK ({} model, {} classes, features: {:?})",
        state.model().kind(),
        state.model().classes().len(),
        state.schema().features()
    );
    Ok(state)
}
