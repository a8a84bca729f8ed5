//! Custom Resource Definitions consumed by the expansion trial.
//!
//! - `StorageCluster`: the ODF/OCS storage cluster whose device sets are scaled out
//! - `CephCluster`: the Rook Ceph cluster reporting health and raw capacity

mod ceph_cluster;
mod storage_cluster;

pub use ceph_cluster::*;
pub use storage_cluster::*;
