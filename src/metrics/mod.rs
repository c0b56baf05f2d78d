//! Graph metric primitives.
//!
//! Everything here is pure and synchronous. Undirected metrics work on
//! [`Adjacency`], a compact simple-graph view built from a petgraph graph.

pub mod assortativity;
pub mod community;
pub mod inequality;
pub mod small_world;
pub mod structure;

pub use assortativity::{attribute_assortativity, numeric_assortativity};
pub use community::{greedy_modularity_communities, modularity};
pub use inequality::{gini, mean, population_std};
pub use small_world::{random_reference, small_world_sigma};
pub use structure::{
    average_clustering, average_shortest_path_length, betweenness_centrality, is_connected,
    local_clustering, Adjacency,
};
