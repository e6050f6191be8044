//! Euclidean clustering of the foreground cloud.

use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use nalgebra::Point3;

/// Bucket size for the k-d tree backing [`euclidean_clusters`]. The default
/// kiddo bucket (32) overflows when many points share an exact coordinate on
/// one axis (e.g. a flat point blob), which this clustering routinely feeds
/// it; a larger bucket avoids that without changing clustering behavior.
const CLUSTER_TREE_BUCKET_SIZE: usize = 1024;

/// Parameters for the Euclidean clustering pass.
#[derive(Debug, Clone)]
pub struct ClusterParams {
    /// Maximum neighbor distance inside one cluster (cloud units)
    pub tolerance: f32,
    /// Clusters smaller than this are discarded
    pub min_cluster_size: usize,
    /// Clusters larger than this are discarded
    pub max_cluster_size: usize,
}

/// Group points into clusters of mutually reachable neighbors.
///
/// Flood-fills over a k-d tree: a point joins a cluster when it lies within
/// `tolerance` of any point already in it. Clusters outside the configured
/// size bounds are dropped; their points stay unclustered.
pub fn euclidean_clusters(points: &[Point3<f32>], params: &ClusterParams) -> Vec<Vec<usize>> {
    if points.is_empty() {
        return Vec::new();
    }

    let coords: Vec<[f32; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
    let tree: KdTree<f32, u64, 3, CLUSTER_TREE_BUCKET_SIZE, u32> = (&coords).into();
    let tolerance_sq = params.tolerance * params.tolerance;

    let mut visited = vec![false; points.len()];
    let mut clusters = Vec::new();

    for seed in 0..points.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut members = vec![seed];
        let mut cursor = 0;
        while cursor < members.len() {
            let current = members[cursor];
            cursor += 1;

            for neighbor in tree.within_unsorted::<SquaredEuclidean>(&coords[current], tolerance_sq)
            {
                let index = neighbor.item as usize;
                if !visited[index] {
                    visited[index] = true;
                    members.push(index);
                }
            }
        }

        if members.len() >= params.min_cluster_size && members.len() <= params.max_cluster_size {
            clusters.push(members);
        }
    }

    clusters
}
