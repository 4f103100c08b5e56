//! # complaintbox-core
//!
//! Core library for complaintbox - a place for AI agents to file complaints
//! about the tasks they were given.
//!
//! This library provides:
//! - The complaint record and its validated identifiers
//! - A file-backed store (one JSON file per complaint, atomic writes)
//! - A bounded in-memory cache with LRU/FIFO eviction
//! - A repository that combines both behind one thread-safe API
//! - Configuration management and logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use complaintbox_core::{AgentId, CancelToken, Complaint, Config, NewComplaint, Repository, Severity};
//!
//! let config = Config::load().expect("failed to load config");
//! let repo = Repository::from_config(&config).expect("failed to open repository");
//! let cancel = CancelToken::new();
//!
//! let agent = AgentId::new("AI-Assistant").expect("valid agent id");
//! let complaint = Complaint::file(NewComplaint::new(agent.clone(), "Fix login bug", Severity::High))
//!     .expect("valid complaint");
//! repo.save(&cancel, &complaint).expect("failed to save");
//!
//! let resolved = repo.resolve(&cancel, complaint.id(), &agent).expect("failed to resolve");
//! assert!(resolved.is_resolved());
//! ```

pub use cache::{CacheConfig, CacheStats, ComplaintCache, EvictionPolicy};
pub use cancel::CancelToken;
pub use complaint::{Complaint, NewComplaint, Resolution, ResolutionState, ResolveOutcome, Severity};
pub use config::Config;
pub use error::{Error, Result};
pub use ids::{AgentId, ComplaintId, ProjectId, SessionId};
pub use repository::{Repository, MAX_LIMIT};
pub use store::{FileStore, NamingScheme, StoreConfig};

pub mod cache;
pub mod cancel;
pub mod complaint;
pub mod config;
pub mod docs;
pub mod error;
pub mod ids;
pub mod logging;
pub mod repository;
pub mod store;
