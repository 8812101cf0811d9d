//! # strata-core
//!
//! Multi-candidate file format discovery and engine-generation classification.
//!
//! This crate provides the core functionality for:
//! - Ranking every plausible format of a file from signatures, structure,
//!   extensions and engine profiles
//! - Classifying files against a timeline of engine generations and
//!   learning cross-generation patterns
//! - Loading plugins that contribute format knowledge and handlers
//! - Running analyses over many files in parallel
//!
//! ## Architecture
//!
//! - [`discovery`]: Detectors and the candidate-ranking engine
//! - [`profiles`]: Engine generation profiles and the release timeline
//! - [`evolution`]: Evolutionary classifier and the lineage log
//! - [`plugins`]: Plugin trait, manifests and the registry
//! - [`batch`]: Parallel batch coordinator
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_core::{DiscoveryConfig, DiscoveryEngine, EvolutionaryClassifier, PluginRegistry};
//!
//! let registry = Arc::new(PluginRegistry::with_builtins());
//! registry.load(&["./plugins"]);
//!
//! let engine = DiscoveryEngine::from_registry(registry, DiscoveryConfig::default());
//! let result = engine.discover("./assets/vehicles.ytd")?;
//! for candidate in &result.candidates {
//!     println!("{} {:.2} via {}", candidate.format, candidate.confidence, candidate.method);
//! }
//!
//! let classifier = EvolutionaryClassifier::new();
//! let evolution = classifier.analyze("./assets/vehicles.ytd")?;
//! println!("use {}", evolution.recommended_reader);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Detector`]: Add a detection strategy to the engine
//! - [`EngineProfile`]: Add an engine generation
//! - [`Plugin`]: Contribute formats and handlers

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod batch;
pub mod discovery;
pub mod error;
pub mod evolution;
pub mod plugins;
pub mod profiles;
pub mod settings;

// Re-export primary types for convenience
pub use batch::{BatchConfig, BatchCoordinator, BatchResult, CancelHandle, ItemOutcome, ProgressSink};
pub use discovery::{Candidate, DetectionMethod, Detector, DiscoveryConfig, DiscoveryEngine, DiscoveryResult, Probe};
pub use error::{Error, Result};
pub use evolution::{ClassifierConfig, EvolutionResult, EvolutionaryClassifier, Insight, LearningReport, LineageLog};
pub use plugins::{Plugin, PluginDescriptor, PluginRegistry};
pub use profiles::{EngineProfile, ProfileMatch, ENGINE_TIMELINE};
pub use settings::Settings;

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
