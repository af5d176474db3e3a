//! wordfield - force-directed 3D assembly of semantic word fields.
//!
//! A question becomes a small set of words with pairwise semantic distances.
//! The distances are relaxed into 3D positions, expanded with golden-angle
//! satellites into a fixed entity pool, and animated through a staged
//! assembly that forms proximity edges and ends in an analyzed structure.

pub mod config;
pub mod connectivity;
pub mod controller;
pub mod entity;
pub mod error;
pub mod expansion;
pub mod geometry;
pub mod hover;
pub mod layout;
pub mod matrix;
pub mod progress;
pub mod provider;
pub mod snapshot;
pub mod space;
pub mod topology;

pub use config::WordfieldConfig;
pub use controller::{AssemblyController, Phase};
pub use error::{AssemblyError, AssemblyResult};
