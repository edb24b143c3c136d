//! form_plugin - Framework/engine independent adaptive planet surfaces
//!
//! This crate maintains a continuously refining triangle mesh for curved,
//! planet-scale shapes. Triangles near a moving focus point are subdivided,
//! triangles that matter less are recombined, and the total stays within a
//! fixed budget of four-node groups ("quaterna").
//!
//! # Features
//!
//! - **Bounded arenas**: nodes, points and quaterna live in fixed-capacity
//!   pools addressed by generation-checked ids; nothing is allocated per tick
//! - **Score-driven churn**: every tick rescores the tree and expands the
//!   most important leaves by reclaiming the least important quaterna
//! - **Crack-free meshing**: each leaf is drawn with one to four triangles
//!   depending on which of its edges a finer neighbor has split
//! - **Queries**: pruned ray casts and sphere-proximity face iteration for a
//!   physics layer
//! - **Regulation**: a feedback controller that sizes the quaterna budget
//!   from measured frame and mesh times
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use form_plugin::{LodParameters, Mesh, SphereShader, Sphere3, Surrounding, SurroundingConfig};
//! use glam::Vec3;
//!
//! let mut surrounding = Surrounding::new(SurroundingConfig::new(4096));
//! let planet = surrounding
//!     .add_polyhedron(Sphere3::new(Vec3::ZERO, 1000.0), 42, Arc::new(SphereShader))
//!     .unwrap();
//!
//! let camera = LodParameters::new(Vec3::new(0.0, 0.0, 1010.0), 1.0);
//! let mut mesh = Mesh::new();
//! if surrounding.tick(&camera) {
//!     surrounding.generate_mesh(&mut mesh);
//! }
//!
//! println!("{} triangles, {} quaterna",
//!     mesh.triangle_count(), surrounding.num_quaterna_used());
//! ```

pub mod types;

// Re-export commonly used items
pub use types::{LodParameters, MinMaxAABB, Plane3, Ray3, Sphere3, Triangle3, Vertex};

// Tree building blocks
pub mod node;
pub mod node_buffer;
pub mod point;
pub mod quaterna;
pub use node::{BlockId, Node, NodeId, Owner, PolyhedronId, Triplet};
pub use point::{Point, PointBuffer, PointId};

// Scoring and surface displacement
pub mod score;
pub mod shader;
pub use shader::{MidPointContext, PlanetShader, PlanetShaderConfig, Shader, SphereShader};

// Formation instances
pub mod polyhedron;
pub use polyhedron::Polyhedron;

// The orchestrator: tick, churn, capacity
pub mod surrounding;
pub use surrounding::{ChurnBudget, ChurnStats, ExpandError, Surrounding, SurroundingConfig};

// Readers of the tree
pub mod face;
pub mod mesh;
pub mod ray_cast;
pub mod sphere_query;
pub use face::{for_each_node_face, Face};
pub use mesh::{Mesh, MeshProperties};
pub use ray_cast::RayCastResult;

// Load regulation
pub mod regulator;
pub use regulator::{Regulator, RegulatorConfig};

// Background ticking
pub mod worker;
pub use worker::{SurroundingWorker, TickRequest, WorkerResult};

// Engine-agnostic metrics
pub mod metrics;

#[cfg(test)]
mod test_utils;
